//! One row of `/api/history`, decoded leniently.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

pub const UNKNOWN_FILE: &str = "Unknown file";
pub const UNKNOWN_PREDICTION: &str = "Unknown";

/// A past prediction stored by the backend.
///
/// Never mutated locally; the only way a record changes is by being deleted
/// on the server and disappearing from the next fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: String,
    pub filename: String,
    pub prediction: String,
    pub confidence: f64,
    pub timestamp: String,
    pub audio_url: String,
}

impl Default for HistoryRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            filename: UNKNOWN_FILE.into(),
            prediction: UNKNOWN_PREDICTION.into(),
            confidence: 0.0,
            timestamp: String::new(),
            audio_url: String::new(),
        }
    }
}

impl HistoryRecord {
    /// Build a record from one JSON element.
    ///
    /// Absent, `null` or wrongly-typed fields fall back to the defaults
    /// (`"Unknown file"`, `"Unknown"`, `0.0`, `""`) so a single malformed
    /// element never invalidates the list around it.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);

        let id = match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let defaults = Self::default();
        Self {
            id,
            filename: text("filename").unwrap_or(defaults.filename),
            prediction: text("prediction").unwrap_or(defaults.prediction),
            confidence: value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(defaults.confidence),
            timestamp: text("timestamp").unwrap_or_default(),
            audio_url: text("audio_url")
                .or_else(|| text("audioUrl"))
                .unwrap_or_default(),
        }
    }

    /// Timestamp as `YYYY-MM-DD HH:MM`, or the raw string when it is not a
    /// recognised ISO-8601 form.
    pub fn display_timestamp(&self) -> String {
        let raw = self.timestamp.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_record() {
        let rec = HistoryRecord::from_value(&json!({
            "id": "abc",
            "timestamp": "2025-03-01T10:15:30.123456",
            "filename": "recording_1.wav",
            "prediction": "Purring",
            "confidence": 0.91,
            "audio_url": "/static/audio/recording_1.wav"
        }));
        assert_eq!(rec.id, "abc");
        assert_eq!(rec.filename, "recording_1.wav");
        assert_eq!(rec.prediction, "Purring");
        assert!((rec.confidence - 0.91).abs() < 1e-12);
        assert_eq!(rec.audio_url, "/static/audio/recording_1.wav");
        assert_eq!(rec.display_timestamp(), "2025-03-01 10:15");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let rec = HistoryRecord::from_value(&json!({ "id": "x" }));
        assert_eq!(rec.filename, "Unknown file");
        assert_eq!(rec.prediction, "Unknown");
        assert_eq!(rec.confidence, 0.0);
        assert_eq!(rec.timestamp, "");
        assert_eq!(rec.audio_url, "");
    }

    #[test]
    fn wrong_types_use_defaults() {
        let rec = HistoryRecord::from_value(&json!({
            "id": 17,
            "filename": null,
            "prediction": 3,
            "confidence": "high"
        }));
        assert_eq!(rec.id, "17");
        assert_eq!(rec.filename, "Unknown file");
        assert_eq!(rec.prediction, "Unknown");
        assert_eq!(rec.confidence, 0.0);
    }

    #[test]
    fn non_object_is_all_defaults() {
        assert_eq!(HistoryRecord::from_value(&json!("junk")), HistoryRecord::default());
    }

    #[test]
    fn camel_case_audio_url_accepted() {
        let rec = HistoryRecord::from_value(&json!({ "audioUrl": "/static/audio/a.wav" }));
        assert_eq!(rec.audio_url, "/static/audio/a.wav");
    }

    #[test]
    fn timestamp_fallbacks() {
        let mut rec = HistoryRecord::default();
        rec.timestamp = "2025-03-01T10:15:30Z".into();
        assert_eq!(rec.display_timestamp(), "2025-03-01 10:15");
        rec.timestamp = "yesterday".into();
        assert_eq!(rec.display_timestamp(), "yesterday");
    }
}
