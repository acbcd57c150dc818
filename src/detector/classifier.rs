use super::EmotionClassifier;
use crate::emotion::{Emotion, EmotionVector};
use crate::error::ClassificationError;
use crate::frame::FrameData;
use serde_json::{Map, Value};
use tracing::trace;

/// Stand-in used when no model is configured. Every call fails, so the
/// sampling loop records the neutral fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClassifier;

impl EmotionClassifier for UnconfiguredClassifier {
    fn classify(&self, _face: &FrameData) -> Result<EmotionVector, ClassificationError> {
        Err(ClassificationError::Unconfigured)
    }
}

/// Turn classifier output into an [`EmotionVector`].
///
/// Accepts a label map, an object holding the map under `emotion` or
/// `emotions`, or a list whose first element is either. Scores on a
/// 0-100 scale are rescaled. Unknown labels are ignored and an empty
/// result yields the neutral fallback.
pub fn normalize_scores(value: &Value) -> Result<EmotionVector, ClassificationError> {
    let scores = find_score_map(value)?;

    let mut pairs = Vec::with_capacity(Emotion::ALL.len());
    for (label, score) in scores {
        let emotion = match label.parse::<Emotion>() {
            Ok(emotion) => emotion,
            Err(_) => {
                trace!("Ignoring unknown classifier label '{}'", label);
                continue;
            }
        };
        let score = score
            .as_f64()
            .ok_or_else(|| ClassificationError::InvalidOutput {
                details: format!("score for '{}' is not a number: {}", label, score),
            })?;
        pairs.push((emotion, score));
    }

    if pairs.iter().any(|(_, score)| *score > 1.0) {
        for (_, score) in pairs.iter_mut() {
            *score /= 100.0;
        }
    }

    Ok(EmotionVector::from_pairs(pairs))
}

fn find_score_map(value: &Value) -> Result<&Map<String, Value>, ClassificationError> {
    match value {
        Value::Array(items) => match items.first() {
            Some(first) => find_score_map(first),
            None => Ok(empty_map()),
        },
        Value::Object(map) => {
            for key in ["emotion", "emotions"] {
                if let Some(Value::Object(nested)) = map.get(key) {
                    return Ok(nested);
                }
            }
            Ok(map)
        }
        other => Err(ClassificationError::InvalidOutput {
            details: format!("expected an object or list, got {}", other),
        }),
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    EMPTY.get_or_init(Map::new)
}
