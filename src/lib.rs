//! Client for the Mewsage cat-vocalisation prediction service.
//!
//! * [`audio`] – microphone capture to disk, WAV header writer, playback.
//! * [`recorder`] – the real-time record → analyze → upload session.
//! * [`api`] – HTTP client for prediction and history endpoints.
//! * [`history`] – past predictions: listing, deletion, playback.
//! * [`display`] – text rendering shared by the CLI.
//! * [`config`] – TOML settings and platform paths.

pub mod api;
pub mod audio;
pub mod config;
pub mod display;
pub mod history;
pub mod recorder;
