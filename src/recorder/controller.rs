//! Real-time record → analyze controller.
//!
//! A session owns one capture file at a time and three timer tasks:
//!
//! | Timer | Default period | Effect |
//! |-------|----------------|--------|
//! | duration | 1 s | bumps `elapsed_secs` |
//! | level | 100 ms | reads the capture's dBFS and normalises it |
//! | analysis | 3 s | once the file is old enough, finalises and uploads it |
//!
//! Every timer runs `tokio::select!` against the session's
//! [`CancellationToken`] and re-checks the session generation under the
//! state lock before mutating anything, so once [`RecorderController::stop`]
//! returns the session is inert.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::state::{RecorderEvent, RecorderPhase, SessionState, SharedState};
use crate::api::PredictionService;
use crate::audio::wav::{self, WavError, WavSpec};
use crate::audio::{normalize_level, CaptureBackend, CaptureError, CaptureSession};
use crate::config::RecorderConfig;
use crate::display::ResultView;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RecorderError {
    /// Microphone missing or the recordings directory is not writable.
    #[error("microphone or storage access denied: {0}")]
    PermissionDenied(#[source] CaptureError),

    #[error("could not start recording: {0}")]
    CaptureStart(#[source] CaptureError),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("capture failed: {0}")]
    Capture(#[source] CaptureError),

    #[error(transparent)]
    Recording(#[from] WavError),

    #[error("internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Drives recording sessions.
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use mewsage::api::HttpClient;
/// use mewsage::audio::CpalCapture;
/// use mewsage::config::{AppPaths, RecorderConfig, ServerConfig};
/// use mewsage::recorder::{RecorderController, RecorderEvent};
///
/// # async fn run() -> anyhow::Result<()> {
/// let api = HttpClient::from_config(&ServerConfig::default())?;
/// let (recorder, mut events) = RecorderController::new(
///     RecorderConfig::default(),
///     AppPaths::new().recordings_dir,
///     Arc::new(CpalCapture::new(None)),
///     Arc::new(api),
/// );
/// recorder.start().await?;
/// while let Some(event) = events.recv().await {
///     if event == RecorderEvent::Stopped {
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct RecorderController {
    inner: Arc<Inner>,
}

struct Inner {
    config: RecorderConfig,
    recordings_dir: PathBuf,
    backend: Arc<dyn CaptureBackend>,
    predictor: Arc<dyn PredictionService>,
    state: SharedState,
    events: mpsc::UnboundedSender<RecorderEvent>,
    /// Single-slot guard for `start()`.
    recording: AtomicBool,
    session: Mutex<Option<ActiveSession>>,
}

struct ActiveSession {
    generation: u64,
    cancel: CancellationToken,
    /// `None` while an analysis cycle owns the file.
    capture: Option<Box<dyn CaptureSession>>,
    path: PathBuf,
    /// When the current capture file was opened.
    segment_started: Instant,
    tasks: Vec<JoinHandle<()>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecorderController {
    pub fn new(
        config: RecorderConfig,
        recordings_dir: PathBuf,
        backend: Arc<dyn CaptureBackend>,
        predictor: Arc<dyn PredictionService>,
    ) -> (Self, mpsc::UnboundedReceiver<RecorderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            recordings_dir,
            backend,
            predictor,
            state: Arc::new(Mutex::new(SessionState::default())),
            events,
            recording: AtomicBool::new(false),
            session: Mutex::new(None),
        });
        (Self { inner }, rx)
    }

    pub fn snapshot(&self) -> SessionState {
        lock(&self.inner.state).clone()
    }

    pub fn is_recording(&self) -> bool {
        self.inner.recording.load(Ordering::Acquire)
    }

    /// `Idle → Recording`.  Returns the path of the new capture file.
    pub async fn start(&self) -> Result<PathBuf, RecorderError> {
        if self
            .inner
            .recording
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecorderError::AlreadyRecording);
        }

        match Arc::clone(&self.inner).begin().await {
            Ok(path) => Ok(path),
            Err(e) => {
                self.inner.recording.store(false, Ordering::Release);
                log::error!("recorder: start failed: {e}");
                let _ = self.inner.events.send(RecorderEvent::Notice(e.to_string()));
                Err(e)
            }
        }
    }

    /// `Recording → Idle`.  Cancels and joins all timers, releases the
    /// capture and finalises the file it was writing.
    ///
    /// Returns `false` when no session was active.
    pub async fn stop(&self) -> bool {
        let Some(mut session) = self.inner.halt(None) else {
            return false;
        };

        for task in &session.tasks {
            task.abort();
        }
        for task in session.tasks.drain(..) {
            let _ = task.await;
        }

        // When an analysis held the file, it was finalised there.
        if let Some(capture) = session.capture.take() {
            let path = session.path.clone();
            let spec = WavSpec::pcm16_mono(self.inner.config.sample_rate);
            match tokio::task::spawn_blocking(move || finalize(capture, &path, spec)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("recorder: finalising {}: {e}", session.path.display()),
                Err(e) => log::warn!("recorder: finalise task failed: {e}"),
            }
        }
        true
    }

    /// Cancel everything without waiting.  Safe in any state, any number of
    /// times.
    ///
    /// A file still held by the capture is finalised in the background, on
    /// the blocking pool when a runtime is available and on a short-lived
    /// thread otherwise, so the recording is left on disk as a playable WAV.
    pub fn teardown(&self) {
        let Some(mut session) = self.inner.halt(None) else {
            return;
        };
        for task in &session.tasks {
            task.abort();
        }
        log::debug!("recorder: torn down session {}", session.generation);

        let Some(capture) = session.capture.take() else {
            return;
        };
        let path = session.path;
        let spec = WavSpec::pcm16_mono(self.inner.config.sample_rate);
        let job = move || {
            if let Err(e) = finalize(capture, &path, spec) {
                log::warn!("recorder: finalising {}: {e}", path.display());
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("mewsage-finalize".into())
                    .spawn(job);
                if let Err(e) = spawned {
                    log::warn!("recorder: could not spawn finalise thread: {e}");
                }
            }
        }
    }
}

impl Drop for RecorderController {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

impl Inner {
    async fn begin(self: Arc<Self>) -> Result<PathBuf, RecorderError> {
        let backend = Arc::clone(&self.backend);
        let dir = self.recordings_dir.clone();
        let rate = self.config.sample_rate;

        let (path, capture) = tokio::task::spawn_blocking(move || {
            backend
                .ensure_access(&dir)
                .map_err(RecorderError::PermissionDenied)?;
            open_capture(backend.as_ref(), &dir, rate)
        })
        .await
        .map_err(|e| RecorderError::Internal(e.to_string()))??;

        let started = Instant::now();
        let generation = {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.phase = RecorderPhase::Recording;
            st.file_path = Some(path.clone());
            st.elapsed_secs = 0;
            st.level = 0.0;
            st.is_recording = true;
            st.is_analyzing = false;
            st.result = None;
            let _ = self.events.send(RecorderEvent::Started { path: path.clone() });
            st.generation
        };

        let cancel = CancellationToken::new();
        // Single-slot guard for the analysis cycle, one per session.
        let analyzing = Arc::new(AtomicBool::new(false));
        *lock(&self.session) = Some(ActiveSession {
            generation,
            cancel: cancel.clone(),
            capture: Some(capture),
            path: path.clone(),
            segment_started: started,
            tasks: Vec::new(),
        });
        log::info!("recorder: session {generation} recording to {}", path.display());

        let tasks = vec![
            self.spawn_ticker(generation, started, cancel.clone()),
            self.spawn_level_poller(generation, cancel.clone()),
            self.spawn_analyzer(generation, analyzing, cancel),
        ];
        self.track(generation, tasks);
        Ok(path)
    }

    /// End the session if it is `generation` (or any session for `None`).
    ///
    /// Flips the state to idle and emits `Stopped` under the state lock,
    /// then releases the recording slot.  The caller decides what to do
    /// with the returned tasks and capture.
    fn halt(&self, generation: Option<u64>) -> Option<ActiveSession> {
        let session = {
            let mut slot = lock(&self.session);
            let matches = match (slot.as_ref(), generation) {
                (None, _) => false,
                (Some(s), Some(g)) => s.generation == g,
                (Some(_), None) => true,
            };
            if !matches {
                return None;
            }
            slot.take()
        }?;
        session.cancel.cancel();

        {
            let mut st = lock(&self.state);
            st.phase = RecorderPhase::Idle;
            st.is_recording = false;
            st.is_analyzing = false;
            st.level = 0.0;
            let _ = self.events.send(RecorderEvent::Stopped);
        }
        self.recording.store(false, Ordering::Release);
        log::info!("recorder: session {} stopped", session.generation);
        Some(session)
    }

    /// Apply `f` to the state if `generation` is still the live session.
    ///
    /// The event `f` returns is sent while the lock is held, which keeps
    /// the event stream ordered with `Stopped`.
    fn update<F>(&self, generation: u64, f: F) -> bool
    where
        F: FnOnce(&mut SessionState) -> Option<RecorderEvent>,
    {
        let mut st = lock(&self.state);
        if st.generation != generation || !st.is_recording {
            return false;
        }
        if let Some(event) = f(&mut st) {
            let _ = self.events.send(event);
        }
        true
    }

    fn track(&self, generation: u64, tasks: Vec<JoinHandle<()>>) {
        let mut slot = lock(&self.session);
        match slot.as_mut() {
            Some(s) if s.generation == generation => {
                s.tasks.retain(|t| !t.is_finished());
                s.tasks.extend(tasks);
            }
            _ => tasks.iter().for_each(JoinHandle::abort),
        }
    }

    fn notice(&self, generation: u64, message: String) {
        self.update(generation, |_| Some(RecorderEvent::Notice(message)));
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Run `on_tick` every `period` (first tick one period from now) until
/// `cancel` fires.
fn spawn_timer<F, Fut>(period: Duration, cancel: CancellationToken, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => on_tick().await,
            }
        }
    })
}

impl Inner {
    fn spawn_ticker(
        self: &Arc<Self>,
        generation: u64,
        started: Instant,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        spawn_timer(self.config.tick_interval(), cancel, move || {
            inner.update(generation, |st| {
                st.elapsed_secs = started.elapsed().as_secs();
                Some(RecorderEvent::Tick {
                    elapsed_secs: st.elapsed_secs,
                })
            });
            std::future::ready(())
        })
    }

    fn spawn_level_poller(self: &Arc<Self>, generation: u64, cancel: CancellationToken) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let floor = self.config.level_floor_db;
        spawn_timer(self.config.level_poll_interval(), cancel, move || {
            let dbfs = match lock(&inner.session).as_ref() {
                Some(s) if s.generation == generation => {
                    s.capture.as_ref().map(|c| c.amplitude_dbfs())
                }
                _ => None,
            };
            if let Some(dbfs) = dbfs {
                let level = normalize_level(dbfs, floor);
                inner.update(generation, |st| {
                    st.level = level;
                    Some(RecorderEvent::Level(level))
                });
            }
            std::future::ready(())
        })
    }

    fn spawn_analyzer(
        self: &Arc<Self>,
        generation: u64,
        analyzing: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        let min_recording = self.config.min_recording();
        spawn_timer(self.config.analysis_interval(), cancel, move || {
            let old_enough = match lock(&inner.session).as_ref() {
                Some(s) if s.generation == generation => {
                    s.capture.is_some() && s.segment_started.elapsed() >= min_recording
                }
                _ => false,
            };
            if old_enough {
                if analyzing
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    let slot = AnalysisSlot(Arc::clone(&analyzing));
                    let task = tokio::spawn(Arc::clone(&inner).analyze(generation, slot));
                    inner.track(generation, vec![task]);
                } else {
                    log::debug!("recorder: analysis still running, tick skipped");
                }
            }
            std::future::ready(())
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis cycle
// ---------------------------------------------------------------------------

/// Releases the analysis slot however the cycle ends (including abort).
struct AnalysisSlot(Arc<AtomicBool>);

impl Drop for AnalysisSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Inner {
    /// Stop capture → inject header → upload → render → stop or roll over.
    async fn analyze(self: Arc<Self>, generation: u64, _slot: AnalysisSlot) {
        let taken = {
            let mut slot = lock(&self.session);
            match slot.as_mut() {
                Some(s) if s.generation == generation => {
                    s.capture.take().map(|c| (c, s.path.clone()))
                }
                _ => None,
            }
        };
        let Some((capture, path)) = taken else {
            return;
        };

        self.update(generation, |st| {
            st.phase = RecorderPhase::Analyzing;
            st.is_analyzing = true;
            Some(RecorderEvent::Analyzing { path: path.clone() })
        });
        log::debug!("recorder: analysing {}", path.display());

        let spec = WavSpec::pcm16_mono(self.config.sample_rate);
        let clip_path = path.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare_clip(capture, &clip_path, spec))
            .await
            .unwrap_or_else(|e| Err(RecorderError::Internal(e.to_string())));

        let view = match prepared {
            Ok(bytes) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let result = self.predictor.predict_realtime(bytes, &filename).await;
                if let Err(e) = &result {
                    log::warn!("recorder: prediction failed: {e}");
                }
                ResultView::from_result(&result)
            }
            Err(e) => {
                log::warn!("recorder: {}: {e}", path.display());
                ResultView::error(e.to_string())
            }
        };

        let live = self.update(generation, |st| {
            st.phase = RecorderPhase::Recording;
            st.is_analyzing = false;
            st.result = Some(view.clone());
            Some(RecorderEvent::Result(view))
        });
        if !live {
            return;
        }

        if self.config.auto_stop_after_analysis {
            // Capture already released; the dropped session only holds the
            // timer handles, which exit on the cancelled token.
            self.halt(Some(generation));
        } else {
            self.roll_over(generation).await;
        }
    }

    /// Open a fresh capture file and keep the session going.
    async fn roll_over(&self, generation: u64) {
        let backend = Arc::clone(&self.backend);
        let dir = self.recordings_dir.clone();
        let rate = self.config.sample_rate;

        let opened = tokio::task::spawn_blocking(move || open_capture(backend.as_ref(), &dir, rate))
            .await
            .unwrap_or_else(|e| Err(RecorderError::Internal(e.to_string())));

        let (path, capture) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                log::error!("recorder: rollover failed: {e}");
                self.notice(generation, e.to_string());
                self.halt(Some(generation));
                return;
            }
        };

        let orphan = {
            let mut slot = lock(&self.session);
            match slot.as_mut() {
                Some(s) if s.generation == generation => {
                    s.capture = Some(capture);
                    s.path = path.clone();
                    s.segment_started = Instant::now();
                    None
                }
                _ => Some(capture),
            }
        };
        if let Some(capture) = orphan {
            // Session ended while the new file was being opened.
            drop(capture);
            remove_quietly(&path);
            return;
        }

        self.update(generation, |st| {
            st.file_path = Some(path.clone());
            Some(RecorderEvent::Started { path })
        });
    }
}

// ---------------------------------------------------------------------------
// Blocking helpers
// ---------------------------------------------------------------------------

fn open_capture(
    backend: &dyn CaptureBackend,
    dir: &Path,
    sample_rate: u32,
) -> Result<(PathBuf, Box<dyn CaptureSession>), RecorderError> {
    let path = next_recording_path(dir);
    match backend.start(&path, sample_rate) {
        Ok(capture) => Ok((path, capture)),
        Err(e) => {
            remove_quietly(&path);
            Err(RecorderError::CaptureStart(e))
        }
    }
}

/// Stop the capture and turn its file into an uploadable WAV.
fn prepare_clip(
    capture: Box<dyn CaptureSession>,
    path: &Path,
    spec: WavSpec,
) -> Result<Vec<u8>, RecorderError> {
    capture.stop().map_err(RecorderError::Capture)?;
    wav::inject_header(path, spec)?;
    std::fs::read(path).map_err(|e| RecorderError::Recording(WavError::Io(e)))
}

/// Stop the capture and add the header.  Empty files are removed.
fn finalize(capture: Box<dyn CaptureSession>, path: &Path, spec: WavSpec) -> Result<(), RecorderError> {
    capture.stop().map_err(RecorderError::Capture)?;
    match wav::inject_header(path, spec) {
        Ok(bytes) => {
            log::info!("recorder: saved {} ({bytes} bytes of audio)", path.display());
            Ok(())
        }
        Err(WavError::EmptyRecording) => {
            remove_quietly(path);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("recorder: could not remove {}: {e}", path.display());
        }
    }
}

/// `dir/recording_<epochMillis>.wav`, bumping the timestamp until the name
/// is unused.
pub fn next_recording_path(dir: &Path) -> PathBuf {
    let mut millis = chrono::Utc::now().timestamp_millis();
    loop {
        let candidate = dir.join(format!("recording_{millis}.wav"));
        if !candidate.exists() {
            return candidate;
        }
        millis += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
