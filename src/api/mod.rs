//! Client side of the Mewsage prediction backend.
//!
//! | Endpoint | Method | Used by |
//! |----------|--------|---------|
//! | `/realtime_predict` | `POST` multipart `audio` | recorder analysis cycle |
//! | `/predict` | `POST` multipart `file_ID` + `file` | `mewsage predict` |
//! | `/api/history?limit=N` | `GET` | history browser |
//! | `/api/history/delete` | `DELETE` `{"ids": [...]}` | history browser |
//! | `/static/audio/{file}` | `GET` | history playback |

pub mod client;
pub mod error;
pub mod response;

#[cfg(test)]
pub(crate) mod test_server;

pub use client::{HistoryApi, HttpClient, PredictionService, MAX_UPLOAD_BYTES};
pub use error::ApiError;
pub use response::{
    decode_history, interpret_delete, interpret_predict, interpret_realtime, DeleteAck,
    PredictionOutcome,
};
