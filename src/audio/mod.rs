//! Audio side of the client: capture to disk, WAV finalisation and playback.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix + resample
//!           → PCM-16 LE appended to recording_<millis>.wav
//!           → inject_header (44-byte RIFF header, rename-over)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mewsage::audio::{wav, CaptureBackend, CpalCapture};
//!
//! let capture = CpalCapture::new(None);
//! let path = Path::new("recording_1700000000000.wav");
//! let session = capture.start(path, 48_000).unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(3));
//! session.stop().unwrap();
//! wav::inject_header(path, wav::WavSpec::pcm16_mono(48_000)).unwrap();
//! ```

pub mod capture;
pub mod level;
pub mod pcm;
pub mod playback;
pub mod wav;

pub use capture::{AudioChunk, CaptureBackend, CaptureError, CaptureSession, CpalCapture};
pub use level::{normalize_level, rms_dbfs};
pub use playback::{AudioPlayer, PlaybackError, RodioPlayer};
pub use wav::{WavError, WavSpec, WAV_HEADER_LEN};
