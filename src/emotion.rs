//! Emotion labels, confidence vectors and timestamped samples.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The closed set of emotion labels, in canonical enumeration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// All labels in enumeration order. Column order of the persisted log.
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmotion(pub String);

impl fmt::Display for UnknownEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown emotion label '{}'", self.0)
    }
}

impl std::error::Error for UnknownEmotion {}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .iter()
            .copied()
            .find(|emotion| emotion.as_str() == label)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// Confidence per emotion label, each value clamped to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionVector([f64; 7]);

impl EmotionVector {
    /// All confidences zero
    pub fn zeros() -> Self {
        Self([0.0; 7])
    }

    /// Fallback used when inference yields nothing usable: neutral=1.0, all others 0.0
    pub fn neutral() -> Self {
        let mut vector = Self::zeros();
        vector.set(Emotion::Neutral, 1.0);
        vector
    }

    /// Build from per-label confidences in enumeration order
    pub fn from_array(values: [f64; 7]) -> Self {
        let mut vector = Self::zeros();
        for (emotion, value) in Emotion::ALL.iter().zip(values) {
            vector.set(*emotion, value);
        }
        vector
    }

    /// Build from (label, confidence) pairs. Labels not listed stay at 0.0;
    /// an empty input yields the neutral fallback.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Emotion, f64)>,
    {
        let mut vector = Self::zeros();
        let mut seen = false;
        for (emotion, value) in pairs {
            vector.set(emotion, value);
            seen = true;
        }
        if seen {
            vector
        } else {
            Self::neutral()
        }
    }

    pub fn get(&self, emotion: Emotion) -> f64 {
        self.0[emotion.index()]
    }

    pub fn set(&mut self, emotion: Emotion, value: f64) {
        self.0[emotion.index()] = clamp_confidence(value);
    }

    /// Label with the highest confidence; ties go to the earliest label
    pub fn dominant(&self) -> (Emotion, f64) {
        let mut best = (Emotion::ALL[0], self.0[0]);
        for emotion in Emotion::ALL.iter().skip(1) {
            let value = self.get(*emotion);
            if value > best.1 {
                best = (*emotion, value);
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(move |emotion| (*emotion, self.get(*emotion)))
    }

    pub fn as_array(&self) -> [f64; 7] {
        self.0
    }
}

impl Default for EmotionVector {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Serialize for EmotionVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Emotion::ALL.len()))?;
        for (emotion, value) in self.iter() {
            map.serialize_entry(emotion.as_str(), &value)?;
        }
        map.end()
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// One timestamped emotion reading. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionSample {
    timestamp: DateTime<Utc>,
    emotions: EmotionVector,
    dominant_emotion: Emotion,
}

impl EmotionSample {
    /// Create a sample, deriving the dominant emotion from the vector
    pub fn new(timestamp: DateTime<Utc>, emotions: EmotionVector) -> Self {
        let (dominant_emotion, _) = emotions.dominant();
        Self {
            timestamp,
            emotions,
            dominant_emotion,
        }
    }

    /// Rebuild a persisted sample whose dominant label was recorded explicitly
    pub fn from_parts(
        timestamp: DateTime<Utc>,
        emotions: EmotionVector,
        dominant_emotion: Emotion,
    ) -> Self {
        Self {
            timestamp,
            emotions,
            dominant_emotion,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn emotions(&self) -> &EmotionVector {
        &self.emotions
    }

    pub fn dominant_emotion(&self) -> Emotion {
        self.dominant_emotion
    }

    /// Confidence of the dominant label
    pub fn confidence(&self) -> f64 {
        self.emotions.get(self.dominant_emotion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_fallback_has_single_full_label() {
        let vector = EmotionVector::neutral();
        for (emotion, value) in vector.iter() {
            if emotion == Emotion::Neutral {
                assert_eq!(value, 1.0);
            } else {
                assert_eq!(value, 0.0);
            }
        }
        assert_eq!(vector.dominant(), (Emotion::Neutral, 1.0));
    }

    #[test]
    fn test_values_are_clamped() {
        let vector = EmotionVector::from_array([1.5, -0.2, f64::NAN, 0.4, 0.0, 0.0, 0.3]);
        assert_eq!(vector.get(Emotion::Angry), 1.0);
        assert_eq!(vector.get(Emotion::Disgust), 0.0);
        assert_eq!(vector.get(Emotion::Fear), 0.0);
        assert_eq!(vector.get(Emotion::Happy), 0.4);
    }

    #[test]
    fn test_dominant_tie_goes_to_first_label() {
        let vector = EmotionVector::from_array([0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.5]);
        assert_eq!(vector.dominant().0, Emotion::Happy);

        let zeros = EmotionVector::zeros();
        assert_eq!(zeros.dominant().0, Emotion::Angry);
    }

    #[test]
    fn test_from_pairs_fills_missing_labels() {
        let vector = EmotionVector::from_pairs([(Emotion::Sad, 0.7), (Emotion::Fear, 0.1)]);
        assert_eq!(vector.get(Emotion::Sad), 0.7);
        assert_eq!(vector.get(Emotion::Fear), 0.1);
        assert_eq!(vector.get(Emotion::Neutral), 0.0);

        let empty = EmotionVector::from_pairs(Vec::new());
        assert_eq!(empty, EmotionVector::neutral());
    }

    #[test]
    fn test_label_parsing() {
        assert_eq!("Happy".parse::<Emotion>().unwrap(), Emotion::Happy);
        assert_eq!(" surprise ".parse::<Emotion>().unwrap(), Emotion::Surprise);
        assert!("contempt".parse::<Emotion>().is_err());
        for emotion in Emotion::ALL {
            assert_eq!(emotion.as_str().parse::<Emotion>().unwrap(), emotion);
        }
    }

    #[test]
    fn test_sample_derives_dominant() {
        let sample = EmotionSample::new(
            Utc::now(),
            EmotionVector::from_pairs([(Emotion::Happy, 0.8), (Emotion::Neutral, 0.2)]),
        );
        assert_eq!(sample.dominant_emotion(), Emotion::Happy);
        assert_eq!(sample.confidence(), 0.8);
    }

    #[test]
    fn test_vector_serializes_as_label_map() {
        let json = serde_json::to_value(EmotionVector::neutral()).unwrap();
        assert_eq!(json["neutral"], 1.0);
        assert_eq!(json["happy"], 0.0);
        assert_eq!(json.as_object().unwrap().len(), 7);
    }
}
