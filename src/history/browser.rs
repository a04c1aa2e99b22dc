//! History browsing: list, batch delete with re-fetch, download-then-play.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use super::record::{HistoryRecord, UNKNOWN_FILE};
use crate::api::{ApiError, HistoryApi};
use crate::audio::{AudioPlayer, PlaybackError};
use crate::display::deleted_notice;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("no history record with id {0}")]
    UnknownId(String),

    #[error("history record {0} has no audio file")]
    NoAudio(String),
}

/// Largest page requested while searching older history for an id.
const MAX_SEARCH_LIMIT: u32 = 1000;

/// Local view of the remote history list.
///
/// The list is never edited in place: every successful delete is followed
/// by a full re-fetch so the local copy always mirrors the server.
pub struct HistoryBrowser {
    api: Arc<dyn HistoryApi>,
    limit: u32,
    records: Vec<HistoryRecord>,
}

impl HistoryBrowser {
    pub fn new(api: Arc<dyn HistoryApi>, limit: u32) -> Self {
        Self {
            api,
            limit,
            records: Vec::new(),
        }
    }

    /// Replace the local list with the server's.
    pub async fn refresh(&mut self) -> Result<&[HistoryRecord], HistoryError> {
        self.records = self.api.fetch_history(self.limit).await?;
        Ok(&self.records)
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn find(&self, id: &str) -> Option<&HistoryRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Delete `ids` on the server, re-fetch, and return the notice to show.
    pub async fn delete(&mut self, ids: &[String]) -> Result<String, HistoryError> {
        if ids.is_empty() {
            return Ok("No recordings selected".to_string());
        }

        let ack = self.api.delete_history(ids).await?;
        let count = ack.deleted_count.unwrap_or(ids.len());
        log::info!("history: deleted {count} record(s)");

        self.refresh().await?;
        Ok(deleted_notice(count))
    }

    /// Find `id`, paging further back than the configured limit when the
    /// loaded list is full and does not contain it.
    ///
    /// Widening stops at the first short page, since the server has nothing
    /// older, or at [`MAX_SEARCH_LIMIT`].
    pub async fn locate(&mut self, id: &str) -> Result<HistoryRecord, HistoryError> {
        if self.records.is_empty() {
            self.refresh().await?;
        }
        let mut limit = self.limit.max(1);
        loop {
            if let Some(record) = self.find(id) {
                return Ok(record.clone());
            }
            if self.records.len() < limit as usize || limit >= MAX_SEARCH_LIMIT {
                return Err(HistoryError::UnknownId(id.to_string()));
            }
            limit = limit.saturating_mul(2).min(MAX_SEARCH_LIMIT);
            log::debug!(
                "history: {id} not in the newest {} records, fetching {limit}",
                self.records.len()
            );
            self.records = self.api.fetch_history(limit).await?;
        }
    }

    /// Download the record's audio to `temp_path` (overwritten each time)
    /// and play it to the end.
    pub async fn play(
        &mut self,
        id: &str,
        player: &dyn AudioPlayer,
        temp_path: &Path,
    ) -> Result<(), HistoryError> {
        let record = self.locate(id).await?;
        let filename =
            audio_filename(&record).ok_or_else(|| HistoryError::NoAudio(id.to_string()))?;

        let bytes = self.api.download_audio(&filename, temp_path).await?;
        log::debug!("history: {filename} downloaded ({bytes} bytes)");

        player.play_file(temp_path).await?;
        Ok(())
    }
}

/// Server-side file name: the record's `filename`, or the last segment of
/// its `audio_url` when the filename is missing.
fn audio_filename(record: &HistoryRecord) -> Option<String> {
    if !record.filename.is_empty() && record.filename != UNKNOWN_FILE {
        return Some(record.filename.clone());
    }
    record
        .audio_url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
