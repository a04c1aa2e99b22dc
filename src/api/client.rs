//! HTTP client for the prediction backend.
//!
//! Two traits form the seam between the rest of the crate and the network:
//!
//! * [`PredictionService`] – the two upload endpoints.
//! * [`HistoryApi`] – listing, batch deletion and audio download.
//!
//! [`HttpClient`] implements both on top of one `reqwest::Client`.  The
//! recorder and the history browser only ever see `Arc<dyn …>`, so tests
//! swap in in-memory doubles.
//!
//! # Example
//! ```rust,no_run
//! use mewsage::api::{HttpClient, PredictionService};
//! use mewsage::config::ServerConfig;
//!
//! # async fn run() -> Result<(), mewsage::api::ApiError> {
//! let client = HttpClient::from_config(&ServerConfig::default())?;
//! let outcome = client
//!     .predict_file(std::path::Path::new("meow.wav"), "4f0c…")
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;

use super::error::ApiError;
use super::response::{
    decode_history, interpret_delete, interpret_predict, interpret_realtime, DeleteAck,
    PredictionOutcome,
};
use crate::config::ServerConfig;
use crate::history::HistoryRecord;

/// The backend answers 413 above this size; refuse before uploading.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Upload endpoints.
#[async_trait]
pub trait PredictionService: Send + Sync {
    /// `POST /realtime_predict` with a finished WAV clip as field `audio`.
    async fn predict_realtime(
        &self,
        wav: Vec<u8>,
        filename: &str,
    ) -> Result<PredictionOutcome, ApiError>;

    /// `POST /predict` with `file_ID` and the file contents as field `file`.
    async fn predict_file(&self, path: &Path, file_id: &str)
        -> Result<PredictionOutcome, ApiError>;
}

/// History endpoints.
#[async_trait]
pub trait HistoryApi: Send + Sync {
    async fn fetch_history(&self, limit: u32) -> Result<Vec<HistoryRecord>, ApiError>;

    async fn delete_history(&self, ids: &[String]) -> Result<DeleteAck, ApiError>;

    /// Download `/static/audio/{filename}` to `dest`, overwriting it.
    /// Returns the number of bytes written.
    async fn download_audio(&self, filename: &str, dest: &Path) -> Result<u64, ApiError>;
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// `reqwest`-backed implementation of both service traits.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: Url,
    upload_timeout: Duration,
}

impl HttpClient {
    /// Build a client for `config.base_url`.
    ///
    /// `timeout_secs` becomes the client-wide timeout; the two uploads
    /// override it per request with `upload_timeout_secs`.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ApiError> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| ApiError::Url(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Url(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Ok(Self {
            client,
            base,
            upload_timeout: config.upload_timeout(),
        })
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Url(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_for_text(&self, req: reqwest::RequestBuilder) -> Result<(u16, String), ApiError> {
        let response = req.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        log::debug!("api: HTTP {status}, {} byte body", body.len());
        Ok((status, body))
    }
}

fn wav_part(bytes: Vec<u8>, filename: &str) -> Result<Part, ApiError> {
    Ok(Part::bytes(bytes)
        .file_name(filename.to_string())
        .mime_str(mime_for(filename))?)
}

fn mime_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl PredictionService for HttpClient {
    async fn predict_realtime(
        &self,
        wav: Vec<u8>,
        filename: &str,
    ) -> Result<PredictionOutcome, ApiError> {
        let size = wav.len() as u64;
        if size > MAX_UPLOAD_BYTES {
            return Err(ApiError::TooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }

        let url = self.endpoint(&["realtime_predict"])?;
        log::info!("api: realtime upload {filename} ({size} bytes)");

        let form = Form::new().part("audio", wav_part(wav, filename)?);
        let req = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form);

        let (status, body) = self.send_for_text(req).await?;
        interpret_realtime(status, &body)
    }

    async fn predict_file(
        &self,
        path: &Path,
        file_id: &str,
    ) -> Result<PredictionOutcome, ApiError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(ApiError::TooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let url = self.endpoint(&["predict"])?;
        log::info!("api: upload {filename} as {file_id} ({size} bytes)");

        let form = Form::new()
            .text("file_ID", file_id.to_string())
            .part("file", wav_part(bytes, &filename)?);
        let req = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form);

        let (status, body) = self.send_for_text(req).await?;
        interpret_predict(status, &body)
    }
}

#[async_trait]
impl HistoryApi for HttpClient {
    async fn fetch_history(&self, limit: u32) -> Result<Vec<HistoryRecord>, ApiError> {
        let mut url = self.endpoint(&["api", "history"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());

        let (status, body) = self.send_for_text(self.client.get(url)).await?;
        if status != 200 {
            return Err(ApiError::Server { status });
        }
        let records = decode_history(&body)?;
        log::debug!("api: fetched {} history records", records.len());
        Ok(records)
    }

    async fn delete_history(&self, ids: &[String]) -> Result<DeleteAck, ApiError> {
        let url = self.endpoint(&["api", "history", "delete"])?;
        log::info!("api: deleting {} history record(s)", ids.len());

        let req = self
            .client
            .delete(url)
            .json(&serde_json::json!({ "ids": ids }));
        let (status, body) = self.send_for_text(req).await?;
        interpret_delete(status, &body)
    }

    async fn download_audio(&self, filename: &str, dest: &Path) -> Result<u64, ApiError> {
        let url = self.endpoint(&["static", "audio", filename])?;
        let response = self.client.get(url).send().await?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(ApiError::NotFound(format!("Audio file not found: {filename}"))),
            status => return Err(ApiError::Server { status }),
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        log::debug!("api: downloaded {filename} to {}", dest.display());
        Ok(bytes.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
