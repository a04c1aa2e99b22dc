//! Local file playback via `rodio`.
//!
//! History playback downloads the remote clip to a temporary file first and
//! then hands the path to an [`AudioPlayer`]; nothing is streamed.
//! [`RodioPlayer`] opens the output device inside a blocking task because
//! `rodio::OutputStream` must stay on the thread that created it.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, Sink};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot decode audio: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),

    #[error("no audio output device: {0}")]
    Output(#[from] rodio::StreamError),

    #[error("cannot create audio sink: {0}")]
    Sink(#[from] rodio::PlayError),

    #[error("playback task failed: {0}")]
    Task(String),
}

/// Plays a complete audio file and resolves when playback has finished.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play_file(&self, path: &Path) -> Result<(), PlaybackError>;
}

/// [`AudioPlayer`] on the default output device.
#[derive(Debug, Clone)]
pub struct RodioPlayer {
    volume: f32,
}

impl RodioPlayer {
    pub fn new() -> Self {
        Self { volume: 1.0 }
    }

    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn play_blocking(path: &Path, volume: f32) -> Result<(), PlaybackError> {
        let file = File::open(path).map_err(|source| PlaybackError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Decoder::new(BufReader::new(file))?;

        let (_stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        sink.set_volume(volume);
        sink.append(source);
        sink.sleep_until_end();
        Ok(())
    }
}

impl Default for RodioPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play_file(&self, path: &Path) -> Result<(), PlaybackError> {
        let path = path.to_path_buf();
        let volume = self.volume;
        log::info!("playback: {}", path.display());

        tokio::task::spawn_blocking(move || Self::play_blocking(&path, volume))
            .await
            .map_err(|e| PlaybackError::Task(e.to_string()))?
    }
}
