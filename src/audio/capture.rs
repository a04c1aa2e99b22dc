//! Microphone capture to a raw PCM file.
//!
//! The recorder talks to capture hardware only through [`CaptureBackend`]
//! and [`CaptureSession`], so the state machine can be driven by a fake in
//! tests.  [`CpalCapture`] is the production backend.
//!
//! `cpal::Stream` is not `Send` on every platform, so each cpal session owns
//! a dedicated `mewsage-capture` thread that builds the stream, converts each
//! [`AudioChunk`] to mono PCM-16 at the target rate through one resampler
//! per stream, appends it to the recording file and publishes the chunk
//! level.  Stopping the session drops the stream on that thread and joins it.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::level::{rms_dbfs, SILENCE_DBFS};
use super::pcm::{downmix_to_mono, f32_to_pcm16_le, LinearResampler};

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl AudioChunk {
    /// Mono PCM-16 LE bytes at the resampler's target rate.
    ///
    /// One `resampler` must be shared by every chunk of a stream so that
    /// interpolation continues across chunk boundaries.
    pub fn to_pcm16_mono(&self, resampler: &mut LinearResampler) -> Vec<u8> {
        let mono = downmix_to_mono(&self.samples, self.channels);
        f32_to_pcm16_le(&resampler.process(&mono))
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running a capture session.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to list input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported input sample format: {0}")]
    SampleFormat(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The recordings directory or file cannot be written.
    #[error("recording storage unavailable: {0}")]
    Storage(#[from] std::io::Error),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

// ---------------------------------------------------------------------------
// Backend / session seams
// ---------------------------------------------------------------------------

/// Source of capture sessions.
pub trait CaptureBackend: Send + Sync {
    /// Verify the microphone and the recordings directory are usable.
    ///
    /// Called before every session start; an error here means the session
    /// must not be started.
    fn ensure_access(&self, recordings_dir: &Path) -> Result<(), CaptureError>;

    /// Begin writing mono PCM-16 LE at `sample_rate` to `path`.
    fn start(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn CaptureSession>, CaptureError>;
}

/// A running capture.
pub trait CaptureSession: Send {
    /// Most recent input level in dBFS (`SILENCE_DBFS` before any audio).
    fn amplitude_dbfs(&self) -> f32;

    /// Stop capturing, flush the file, and return the payload bytes written.
    fn stop(self: Box<Self>) -> Result<u64, CaptureError>;
}

/// Check that `dir` exists (creating it) and accepts new files.
pub fn ensure_writable_dir(dir: &Path) -> Result<(), CaptureError> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".write_probe");
    File::create(&probe)?;
    if let Err(e) = fs::remove_file(&probe) {
        log::warn!("capture: could not remove {}: {e}", probe.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Microphone capture built on top of `cpal`.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use mewsage::audio::{CaptureBackend, CpalCapture};
///
/// let capture = CpalCapture::new(None);
/// capture.ensure_access(Path::new("recordings")).unwrap();
/// let session = capture.start(Path::new("recordings/take.wav"), 48_000).unwrap();
/// std::thread::sleep(std::time::Duration::from_secs(2));
/// let bytes = session.stop().unwrap();
/// println!("{bytes} PCM bytes captured");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    /// `device_name == None` selects the system default input.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.clone())),
        }
    }
}

impl CaptureBackend for CpalCapture {
    fn ensure_access(&self, recordings_dir: &Path) -> Result<(), CaptureError> {
        let device = self.device()?;
        device.default_input_config()?;
        ensure_writable_dir(recordings_dir)
    }

    fn start(&self, path: &Path, sample_rate: u32) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let file = BufWriter::new(File::create(path)?);
        let stop = Arc::new(AtomicBool::new(false));
        let level = Arc::new(AtomicU32::new(SILENCE_DBFS.to_bits()));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();

        let capture = self.clone();
        let thread_stop = Arc::clone(&stop);
        let thread_level = Arc::clone(&level);

        let thread = std::thread::Builder::new()
            .name("mewsage-capture".into())
            .spawn(move || {
                capture.run(file, sample_rate, thread_stop, thread_level, ready_tx)
            })
            .map_err(|e| CaptureError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("capture: recording to {} @ {sample_rate} Hz", path.display());
                Ok(Box::new(CpalSession {
                    stop,
                    level,
                    thread: Some(thread),
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let detail = match thread.join() {
                    Ok(Err(e)) => e.to_string(),
                    _ => "capture thread exited before the stream started".into(),
                };
                Err(CaptureError::Thread(detail))
            }
        }
    }
}

impl CpalCapture {
    /// Body of the capture thread.  Reports stream start-up through `ready`,
    /// then pumps chunks into `out` until `stop` is raised.
    fn run(
        &self,
        mut out: BufWriter<File>,
        target_rate: u32,
        stop: Arc<AtomicBool>,
        level: Arc<AtomicU32>,
        ready: mpsc::Sender<Result<(), CaptureError>>,
    ) -> Result<u64, CaptureError> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();

        let stream = match self.open_stream(chunk_tx) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = ready.send(Err(e));
                return Ok(0);
            }
        };
        let _ = ready.send(Ok(()));

        let mut written: u64 = 0;
        let mut resampler: Option<LinearResampler> = None;
        let mut write_chunk = |chunk: &AudioChunk, out: &mut BufWriter<File>| {
            level.store(rms_dbfs(&chunk.samples).to_bits(), Ordering::Relaxed);
            if resampler.as_ref().is_some_and(|r| r.from_rate() != chunk.sample_rate) {
                resampler = None;
            }
            let stream_resampler = resampler
                .get_or_insert_with(|| LinearResampler::new(chunk.sample_rate, target_rate));
            let bytes = chunk.to_pcm16_mono(stream_resampler);
            out.write_all(&bytes)?;
            written += bytes.len() as u64;
            Ok::<(), std::io::Error>(())
        };

        while !stop.load(Ordering::Acquire) {
            match chunk_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(chunk) => write_chunk(&chunk, &mut out)?,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(stream);
        for chunk in chunk_rx.try_iter() {
            write_chunk(&chunk, &mut out)?;
        }
        out.flush()?;

        Ok(written)
    }

    fn open_stream(&self, tx: mpsc::Sender<AudioChunk>) -> Result<cpal::Stream, CaptureError> {
        let device = self.device()?;
        let supported = device.default_input_config()?;

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let on_error = |err: cpal::StreamError| log::error!("cpal stream error: {err}");

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the session is shutting down.
                    let _ = tx.send(AudioChunk {
                        samples: data.to_vec(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(AudioChunk {
                        samples: data.iter().map(|&s| s as f32 / i16::MAX as f32).collect(),
                        sample_rate,
                        channels,
                    });
                },
                on_error,
                None,
            )?,
            other => return Err(CaptureError::SampleFormat(other.to_string())),
        };

        stream.play()?;
        log::debug!("capture: device stream {sample_rate} Hz, {channels} ch, {sample_format}");
        Ok(stream)
    }
}

// ---------------------------------------------------------------------------
// CpalSession
// ---------------------------------------------------------------------------

struct CpalSession {
    stop: Arc<AtomicBool>,
    level: Arc<AtomicU32>,
    thread: Option<JoinHandle<Result<u64, CaptureError>>>,
}

impl CaptureSession for CpalSession {
    fn amplitude_dbfs(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    fn stop(mut self: Box<Self>) -> Result<u64, CaptureError> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CaptureError::Thread("capture thread panicked".into()))?,
            None => Ok(0),
        }
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
