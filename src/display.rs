//! Text rendering of predictions, history rows and notices.
//!
//! Everything the CLI prints about a result goes through [`ResultView`] so
//! that the recorder, `mewsage predict` and the history browser agree on
//! wording and number formatting.

use std::fmt;

use crate::api::{ApiError, PredictionOutcome};
use crate::history::HistoryRecord;

/// Label shown when the detector rejects a clip (either a 200 with
/// `cat_detected: false` or a 400 reply).
pub const NOT_A_CAT_LABEL: &str = "Not a cat sound";

/// `0.87` → `"87.00%"`.
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.2}%", confidence * 100.0)
}

// ---------------------------------------------------------------------------
// ResultView
// ---------------------------------------------------------------------------

/// What the result area shows after an analysis or upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub label: String,
    /// Empty for errors.
    pub confidence_text: String,
    pub is_error: bool,
}

impl ResultView {
    pub fn from_outcome(outcome: &PredictionOutcome) -> Self {
        let (label, confidence) = match outcome {
            PredictionOutcome::CatSound {
                label, confidence, ..
            } => (label.clone(), *confidence),
            PredictionOutcome::NotACat {
                detector_confidence,
            } => (NOT_A_CAT_LABEL.to_string(), *detector_confidence),
        };
        Self {
            label,
            confidence_text: format_confidence(confidence),
            is_error: false,
        }
    }

    /// An error string rendered in place of the prediction.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            label: message.into(),
            confidence_text: String::new(),
            is_error: true,
        }
    }

    pub fn from_error(err: &ApiError) -> Self {
        Self::error(err.to_string())
    }

    pub fn from_result(result: &Result<PredictionOutcome, ApiError>) -> Self {
        match result {
            Ok(outcome) => Self::from_outcome(outcome),
            Err(e) => Self::from_error(e),
        }
    }
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_error {
            write!(f, "Error: {}", self.label)
        } else {
            write!(f, "Prediction: {}\nConfidence: {}", self.label, self.confidence_text)
        }
    }
}

/// Up to `n` class probabilities, one indented line each.
pub fn probability_lines(outcome: &PredictionOutcome, n: usize) -> Vec<String> {
    outcome
        .top_probabilities(n)
        .into_iter()
        .map(|(label, p)| format!("  {label:<20} {:>8}", format_confidence(p)))
        .collect()
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub fn history_row(record: &HistoryRecord) -> String {
    format!(
        "{:<16}  {:<20} {:>8}  {}  [{}]",
        record.display_timestamp(),
        record.prediction,
        format_confidence(record.confidence),
        record.filename,
        record.id
    )
}

/// Confirmation shown after a successful batch delete.
pub fn deleted_notice(count: usize) -> String {
    if count == 1 {
        "Deleted 1 recording".to_string()
    } else {
        format!("Deleted {count} recordings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::interpret_realtime;
    use std::collections::BTreeMap;

    #[test]
    fn cat_sound_view() {
        let view = ResultView::from_outcome(&PredictionOutcome::CatSound {
            label: "meow_hungry".into(),
            confidence: 0.87,
            probabilities: BTreeMap::new(),
        });
        assert_eq!(view.label, "meow_hungry");
        assert_eq!(view.confidence_text, "87.00%");
        assert!(!view.is_error);
    }

    #[test]
    fn not_a_cat_view() {
        let view = ResultView::from_outcome(&PredictionOutcome::NotACat {
            detector_confidence: 0.42,
        });
        assert_eq!(view.label, "Not a cat sound");
        assert_eq!(view.confidence_text, "42.00%");
    }

    #[test]
    fn bad_request_renders_like_detector_rejection() {
        let from_400 =
            ResultView::from_result(&interpret_realtime(400, r#"{"cat_detector_confidence":0.10}"#));
        let from_200 = ResultView::from_result(&interpret_realtime(
            200,
            r#"{"cat_detected":false,"cat_detector_confidence":0.10}"#,
        ));
        assert_eq!(from_400, from_200);
        assert_eq!(from_400.label, NOT_A_CAT_LABEL);
        assert_eq!(from_400.confidence_text, "10.00%");
    }

    #[test]
    fn server_error_view() {
        let view = ResultView::from_result(&interpret_realtime(503, ""));
        assert!(view.is_error);
        assert!(view.label.starts_with("Server error occurred"));
        assert!(view.to_string().starts_with("Error: "));
    }

    #[test]
    fn confidence_rounding() {
        assert_eq!(format_confidence(0.0), "0.00%");
        assert_eq!(format_confidence(1.0), "100.00%");
        assert_eq!(format_confidence(0.12345), "12.35%");
    }

    #[test]
    fn notice_contains_count() {
        assert!(deleted_notice(2).contains('2'));
        assert_eq!(deleted_notice(1), "Deleted 1 recording");
    }

    #[test]
    fn history_row_has_all_columns() {
        let row = history_row(&HistoryRecord {
            id: "42".into(),
            filename: "a.wav".into(),
            prediction: "Purring".into(),
            confidence: 0.5,
            timestamp: "2025-03-01T10:15:30".into(),
            audio_url: String::new(),
        });
        for part in ["2025-03-01 10:15", "Purring", "50.00%", "a.wav", "[42]"] {
            assert!(row.contains(part), "{row} missing {part}");
        }
    }

    #[test]
    fn probability_lines_are_ranked() {
        let outcome = PredictionOutcome::CatSound {
            label: "Angry".into(),
            confidence: 0.6,
            probabilities: BTreeMap::from([
                ("Angry".to_string(), 0.6),
                ("Happy".to_string(), 0.3),
                ("Hungry".to_string(), 0.1),
            ]),
        };
        let lines = probability_lines(&outcome, 2);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Angry") && lines[0].contains("60.00%"));
        assert!(lines[1].contains("Happy"));
    }
}
