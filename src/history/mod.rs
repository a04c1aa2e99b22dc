//! Past predictions stored by the backend.

pub mod browser;
pub mod record;

pub use browser::{HistoryBrowser, HistoryError};
pub use record::{HistoryRecord, UNKNOWN_FILE, UNKNOWN_PREDICTION};
