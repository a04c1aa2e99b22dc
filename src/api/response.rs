//! Backend response shapes and their interpretation.
//!
//! Interpretation is kept separate from transport so that the status/body
//! rules can be exercised without a server:
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 200 | branch on `cat_detected` |
//! | 400 | detector said "not a cat"; only `cat_detector_confidence` is used |
//! | other | generic server error |

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;
use crate::history::HistoryRecord;

// ---------------------------------------------------------------------------
// PredictionOutcome
// ---------------------------------------------------------------------------

/// What the backend concluded about one clip.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    /// The detector accepted the clip and the classifier labelled it.
    CatSound {
        label: String,
        confidence: f64,
        /// Per-class probabilities, when the server sent them.
        probabilities: BTreeMap<String, f64>,
    },
    /// The detector rejected the clip.
    NotACat { detector_confidence: f64 },
}

impl PredictionOutcome {
    /// The `n` most likely classes, highest first.
    pub fn top_probabilities(&self, n: usize) -> Vec<(&str, f64)> {
        let PredictionOutcome::CatSound { probabilities, .. } = self else {
            return Vec::new();
        };
        let mut ranked: Vec<(&str, f64)> = probabilities
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Body of `POST /realtime_predict`.
#[derive(Debug, Deserialize)]
struct RealtimeBody {
    #[serde(default)]
    cat_detected: bool,
    prediction: Option<String>,
    confidence: Option<f64>,
    cat_detector_confidence: Option<f64>,
    probabilities: Option<BTreeMap<String, f64>>,
}

/// Body of `POST /predict`.
#[derive(Debug, Deserialize)]
struct PredictBody {
    #[serde(default)]
    cat_detected: bool,
    cat_sound_prediction: Option<String>,
    cat_sound_confidence: Option<f64>,
    cat_detector_confidence: Option<f64>,
    cat_sound_probabilities: Option<BTreeMap<String, f64>>,
}

/// Acknowledgement of `DELETE /api/history/delete`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeleteAck {
    pub deleted_count: Option<usize>,
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

/// Interpret a `/realtime_predict` reply.
pub fn interpret_realtime(status: u16, body: &str) -> Result<PredictionOutcome, ApiError> {
    match status {
        200 => {
            let parsed: RealtimeBody = serde_json::from_str(body)?;
            Ok(if parsed.cat_detected {
                cat_sound(parsed.prediction, parsed.confidence, parsed.probabilities)
            } else {
                not_a_cat(parsed.cat_detector_confidence)
            })
        }
        400 => Ok(rejected_by_detector(body)),
        status => Err(ApiError::Server { status }),
    }
}

/// Interpret a `/predict` reply.
pub fn interpret_predict(status: u16, body: &str) -> Result<PredictionOutcome, ApiError> {
    match status {
        200 => {
            let parsed: PredictBody = serde_json::from_str(body)?;
            Ok(if parsed.cat_detected {
                cat_sound(
                    parsed.cat_sound_prediction,
                    parsed.cat_sound_confidence,
                    parsed.cat_sound_probabilities,
                )
            } else {
                not_a_cat(parsed.cat_detector_confidence)
            })
        }
        400 => Ok(rejected_by_detector(body)),
        status => Err(ApiError::Server { status }),
    }
}

/// Interpret a history delete reply.
pub fn interpret_delete(status: u16, body: &str) -> Result<DeleteAck, ApiError> {
    match status {
        200 => Ok(serde_json::from_str(body).unwrap_or_default()),
        404 => Err(ApiError::NotFound("No matching records found".into())),
        status => Err(ApiError::Server { status }),
    }
}

/// Decode the `/api/history` array, one lenient record per element.
pub fn decode_history(body: &str) -> Result<Vec<HistoryRecord>, ApiError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => Ok(items.iter().map(HistoryRecord::from_value).collect()),
        other => Err(ApiError::Parse(format!(
            "expected a JSON array of history records, got {}",
            json_kind(&other)
        ))),
    }
}

fn cat_sound(
    label: Option<String>,
    confidence: Option<f64>,
    probabilities: Option<BTreeMap<String, f64>>,
) -> PredictionOutcome {
    PredictionOutcome::CatSound {
        label: label.unwrap_or_else(|| "Unknown".into()),
        confidence: confidence.unwrap_or(0.0),
        probabilities: probabilities.unwrap_or_default(),
    }
}

fn not_a_cat(confidence: Option<f64>) -> PredictionOutcome {
    PredictionOutcome::NotACat {
        detector_confidence: confidence.unwrap_or(0.0),
    }
}

/// A 400 is rendered like a detector rejection; the body may not even be
/// JSON (FastAPI `detail` strings), in which case the confidence is zero.
fn rejected_by_detector(body: &str) -> PredictionOutcome {
    let confidence = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("cat_detector_confidence").and_then(Value::as_f64));
    not_a_cat(confidence)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_cat_detected() {
        let body = r#"{"success":true,"cat_detected":true,"cat_detector_prediction":"cat",
            "cat_detector_confidence":0.99,"prediction":"meow_hungry","confidence":0.87,
            "probabilities":{"meow_hungry":0.87,"purr":0.1,"hiss":0.03}}"#;

        let outcome = interpret_realtime(200, body).unwrap();
        match &outcome {
            PredictionOutcome::CatSound {
                label, confidence, ..
            } => {
                assert_eq!(label, "meow_hungry");
                assert!((confidence - 0.87).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        let top = outcome.top_probabilities(2);
        assert_eq!(top, vec![("meow_hungry", 0.87), ("purr", 0.1)]);
    }

    #[test]
    fn realtime_not_a_cat() {
        let body = r#"{"success":true,"cat_detected":false,"cat_detector_confidence":0.42,
            "message":"Not a cat sound"}"#;
        assert_eq!(
            interpret_realtime(200, body).unwrap(),
            PredictionOutcome::NotACat {
                detector_confidence: 0.42
            }
        );
    }

    #[test]
    fn realtime_400_is_detector_rejection() {
        assert_eq!(
            interpret_realtime(400, r#"{"cat_detector_confidence":0.10}"#).unwrap(),
            PredictionOutcome::NotACat {
                detector_confidence: 0.10
            }
        );
    }

    #[test]
    fn realtime_400_with_detail_only() {
        let outcome =
            interpret_realtime(400, r#"{"detail":"Realtime audio processing error"}"#).unwrap();
        assert_eq!(
            outcome,
            PredictionOutcome::NotACat {
                detector_confidence: 0.0
            }
        );
    }

    #[test]
    fn realtime_other_status_is_server_error() {
        let err = interpret_realtime(500, r#"{"detail":"Internal server error"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 500 }));
    }

    #[test]
    fn realtime_malformed_body_is_parse_error() {
        let err = interpret_realtime(200, "<html>").unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[test]
    fn realtime_cat_without_label_falls_back() {
        let outcome = interpret_realtime(200, r#"{"cat_detected":true}"#).unwrap();
        assert_eq!(
            outcome,
            PredictionOutcome::CatSound {
                label: "Unknown".into(),
                confidence: 0.0,
                probabilities: BTreeMap::new(),
            }
        );
    }

    #[test]
    fn predict_uses_cat_sound_fields() {
        let body = r#"{"success":true,"cat_detected":true,"cat_detector_prediction":"cat",
            "cat_detector_confidence":0.97,"cat_sound_prediction":"Angry",
            "cat_sound_confidence":0.64,"audio_url":"/static/audio/a.wav",
            "probabilities":{"cat":0.97,"not_cat":0.03},
            "cat_sound_probabilities":{"Angry":0.64,"Happy":0.36}}"#;

        let outcome = interpret_predict(200, body).unwrap();
        assert_eq!(
            outcome.top_probabilities(5),
            vec![("Angry", 0.64), ("Happy", 0.36)]
        );
        assert!(matches!(
            outcome,
            PredictionOutcome::CatSound { ref label, .. } if label == "Angry"
        ));
    }

    #[test]
    fn predict_not_a_cat_and_400() {
        let body = r#"{"success":true,"cat_detected":false,"cat_detector_confidence":0.8,
            "cat_sound_prediction":null,"cat_sound_confidence":null}"#;
        assert_eq!(
            interpret_predict(200, body).unwrap(),
            PredictionOutcome::NotACat {
                detector_confidence: 0.8
            }
        );
        assert_eq!(
            interpret_predict(400, "bad request").unwrap(),
            PredictionOutcome::NotACat {
                detector_confidence: 0.0
            }
        );
        assert!(matches!(
            interpret_predict(413, "").unwrap_err(),
            ApiError::Server { status: 413 }
        ));
    }

    #[test]
    fn delete_statuses() {
        let ack = interpret_delete(
            200,
            r#"{"success":true,"deleted_count":2,"message":"Deleted 2 items"}"#,
        )
        .unwrap();
        assert_eq!(ack.deleted_count, Some(2));

        assert_eq!(interpret_delete(200, "").unwrap(), DeleteAck::default());
        assert!(matches!(
            interpret_delete(404, r#"{"detail":"No matching records found"}"#),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            interpret_delete(500, ""),
            Err(ApiError::Server { status: 500 })
        ));
    }

    #[test]
    fn history_malformed_element_does_not_fail_list() {
        let body = r#"[
            {"id":"1","filename":"a.wav","prediction":"Purring","confidence":0.5,"timestamp":"t","audio_url":"/static/audio/a.wav"},
            {"id":"2","confidence":"oops"},
            42
        ]"#;
        let records = decode_history(body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].prediction, "Purring");
        assert_eq!(records[1].filename, "Unknown file");
        assert_eq!(records[1].confidence, 0.0);
        assert_eq!(records[2].id, "");
    }

    #[test]
    fn history_non_array_is_parse_error() {
        let err = decode_history(r#"{"detail":"Database error"}"#).unwrap_err();
        match err {
            ApiError::Parse(msg) => assert!(msg.contains("an object"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
