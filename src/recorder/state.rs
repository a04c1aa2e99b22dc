//! Recorder state machine and the state shared with observers.
//!
//! [`SessionState`] is the single source of truth for a recording session.
//! The controller mutates it from its timer tasks behind a [`SharedState`];
//! the CLI reads snapshots of it or follows the [`RecorderEvent`] stream.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::display::ResultView;

// ---------------------------------------------------------------------------
// RecorderPhase
// ---------------------------------------------------------------------------

/// Phases of the record → analyze cycle.
///
/// ```text
/// Idle ──start──▶ Recording ──analysis tick (≥ min duration)──▶ Analyzing
///                     ▲                                            │
///                     └──────── rollover (auto-stop disabled) ◀────┤
/// Idle ◀──────────────── stop / teardown / auto-stop ◀─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderPhase {
    #[default]
    Idle,
    /// Capture is writing raw PCM to the session file.
    Recording,
    /// The current file is being finalised and uploaded.
    Analyzing,
}

impl RecorderPhase {
    /// Status-line text for the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            RecorderPhase::Idle => "Idle",
            RecorderPhase::Recording => "Recording",
            RecorderPhase::Analyzing => "Analyzing",
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub phase: RecorderPhase,

    /// Incremented on every `start()`.  Timer callbacks carry the value they
    /// were spawned with and do nothing once it no longer matches.
    pub generation: u64,

    /// File currently being captured (or the last one, once idle).
    pub file_path: Option<PathBuf>,

    /// Whole seconds since the session started.  Display only.
    pub elapsed_secs: u64,

    /// Normalised input level in `[0, 1]`.  Display only.
    pub level: f32,

    pub is_recording: bool,
    pub is_analyzing: bool,

    /// Last rendered analysis result or error.
    pub result: Option<ResultView>,
}

/// Thread-safe handle to [`SessionState`].
///
/// Lock for short critical sections only; never hold it across `.await`.
pub type SharedState = Arc<Mutex<SessionState>>;

// ---------------------------------------------------------------------------
// RecorderEvent
// ---------------------------------------------------------------------------

/// Notifications emitted by the controller, in order, on an unbounded
/// channel.  Nothing is emitted for a session after its `Stopped`.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    /// A capture file was opened (session start or rollover).
    Started { path: PathBuf },
    Tick { elapsed_secs: u64 },
    Level(f32),
    Analyzing { path: PathBuf },
    Result(ResultView),
    /// Something the user should see that is not a prediction.
    Notice(String),
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        let st = SessionState::default();
        assert_eq!(st.phase, RecorderPhase::Idle);
        assert!(!st.is_recording);
        assert!(!st.is_analyzing);
        assert_eq!(st.generation, 0);
        assert!(st.result.is_none());
    }

    #[test]
    fn labels() {
        assert_eq!(RecorderPhase::Idle.label(), "Idle");
        assert_eq!(RecorderPhase::Recording.label(), "Recording");
        assert_eq!(RecorderPhase::Analyzing.label(), "Analyzing");
    }
}
