//! Real-time recording sessions: capture, periodic analysis, teardown.

pub mod controller;
pub mod state;

pub use controller::{next_recording_path, RecorderController, RecorderError};
pub use state::{RecorderEvent, RecorderPhase, SessionState};
