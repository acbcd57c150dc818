//! Aggregate and transition statistics over a window of samples.

use crate::emotion::{Emotion, EmotionSample, EmotionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which trailing part of an ordered history statistics are computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Window {
    /// The whole history
    All,
    /// The most recent `n` samples
    Last(usize),
}

impl Window {
    /// `0` means the full history
    pub fn from_rows(rows: usize) -> Self {
        if rows == 0 {
            Window::All
        } else {
            Window::Last(rows)
        }
    }

    pub fn apply<'a, T>(&self, history: &'a [T]) -> &'a [T] {
        match self {
            Window::All => history,
            Window::Last(n) => &history[history.len().saturating_sub(*n)..],
        }
    }
}

/// Summary of a non-empty window of samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_count: usize,
    /// Seconds between the first and last sample, never negative
    pub session_duration: f64,
    pub avg_emotions: EmotionVector,
    /// Dominant label -> number of samples; only observed labels appear
    pub emotion_distribution: BTreeMap<Emotion, usize>,
    /// From label -> (to label -> probability). Every row sums to 1.
    pub transitions: BTreeMap<Emotion, BTreeMap<Emotion, f64>>,
}

impl Statistics {
    pub fn session_minutes(&self) -> f64 {
        self.session_duration / 60.0
    }

    /// Most frequent dominant label; ties go to the earliest label
    pub fn most_frequent(&self) -> Option<Emotion> {
        let mut best: Option<(Emotion, usize)> = None;
        for (emotion, count) in &self.emotion_distribution {
            match best {
                Some((_, best_count)) if *count <= best_count => {}
                _ => best = Some((*emotion, *count)),
            }
        }
        best.map(|(emotion, _)| emotion)
    }

    pub fn average(&self, emotion: Emotion) -> f64 {
        self.avg_emotions.get(emotion)
    }

    pub fn transition_probability(&self, from: Emotion, to: Emotion) -> f64 {
        self.transitions
            .get(&from)
            .and_then(|row| row.get(&to))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Compute statistics over an ordered window. `None` for an empty window.
pub fn compute(window: &[EmotionSample]) -> Option<Statistics> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return None,
    };

    let total_count = window.len();

    let session_duration = (last.timestamp() - first.timestamp())
        .to_std()
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);

    let mut sums = [0.0f64; 7];
    for sample in window {
        for (slot, value) in sums.iter_mut().zip(sample.emotions().as_array()) {
            *slot += value;
        }
    }
    let avg_emotions = EmotionVector::from_array(sums.map(|sum| sum / total_count as f64));

    let mut emotion_distribution = BTreeMap::new();
    for sample in window {
        *emotion_distribution
            .entry(sample.dominant_emotion())
            .or_insert(0usize) += 1;
    }

    Some(Statistics {
        total_count,
        session_duration,
        avg_emotions,
        emotion_distribution,
        transitions: transition_probabilities(window),
    })
}

/// Adjacent-pair transition probabilities keyed by dominant label
pub fn transition_probabilities(
    window: &[EmotionSample],
) -> BTreeMap<Emotion, BTreeMap<Emotion, f64>> {
    let mut counts: BTreeMap<Emotion, BTreeMap<Emotion, usize>> = BTreeMap::new();
    for pair in window.windows(2) {
        *counts
            .entry(pair[0].dominant_emotion())
            .or_default()
            .entry(pair[1].dominant_emotion())
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|(from, row)| {
            let row_total: usize = row.values().sum();
            let probabilities = row
                .into_iter()
                .map(|(to, count)| (to, count as f64 / row_total as f64))
                .collect();
            (from, probabilities)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample_at(seconds: i64, dominant: Emotion) -> EmotionSample {
        EmotionSample::new(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds),
            EmotionVector::from_pairs([(dominant, 0.8)]),
        )
    }

    fn sequence(labels: &[Emotion]) -> Vec<EmotionSample> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| sample_at(i as i64, *label))
            .collect()
    }

    #[test]
    fn test_empty_window_has_no_statistics() {
        assert!(compute(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let stats = compute(&[sample_at(0, Emotion::Sad)]).unwrap();
        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.session_duration, 0.0);
        assert!(stats.transitions.is_empty());
        assert_eq!(stats.emotion_distribution.get(&Emotion::Sad), Some(&1));
        assert_eq!(stats.average(Emotion::Sad), 0.8);
    }

    #[test]
    fn test_happy_happy_sad_scenario() {
        let window = sequence(&[Emotion::Happy, Emotion::Happy, Emotion::Sad]);
        let stats = compute(&window).unwrap();

        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.session_duration, 2.0);

        let distribution: Vec<(Emotion, usize)> =
            stats.emotion_distribution.clone().into_iter().collect();
        assert_eq!(distribution, vec![(Emotion::Happy, 2), (Emotion::Sad, 1)]);

        assert_eq!(stats.transitions.len(), 1);
        let happy = &stats.transitions[&Emotion::Happy];
        assert_eq!(happy.len(), 2);
        assert_eq!(happy[&Emotion::Happy], 0.5);
        assert_eq!(happy[&Emotion::Sad], 0.5);
        assert!(!stats.transitions.contains_key(&Emotion::Sad));
    }

    #[test]
    fn test_transition_rows_sum_to_one() {
        use Emotion::*;
        let window = sequence(&[
            Neutral, Happy, Happy, Surprise, Neutral, Sad, Neutral, Neutral, Angry, Fear,
            Disgust, Neutral, Happy, Neutral,
        ]);
        let stats = compute(&window).unwrap();

        for (from, row) in &stats.transitions {
            let total: f64 = row.values().sum();
            assert!((total - 1.0).abs() < 1e-9, "row {} sums to {}", from, total);
        }
        assert!((stats.transition_probability(Neutral, Happy) - 0.4).abs() < 1e-9);
        assert_eq!(stats.transition_probability(Fear, Happy), 0.0);
    }

    #[test]
    fn test_averages_are_per_label_means() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let window = vec![
            EmotionSample::new(
                t0,
                EmotionVector::from_pairs([(Emotion::Happy, 1.0), (Emotion::Sad, 0.2)]),
            ),
            EmotionSample::new(
                t0 + Duration::milliseconds(1500),
                EmotionVector::from_pairs([(Emotion::Happy, 0.0), (Emotion::Sad, 0.6)]),
            ),
        ];
        let stats = compute(&window).unwrap();

        assert!((stats.average(Emotion::Happy) - 0.5).abs() < 1e-9);
        assert!((stats.average(Emotion::Sad) - 0.4).abs() < 1e-9);
        assert_eq!(stats.average(Emotion::Neutral), 0.0);
        assert!((stats.session_duration - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_clock_going_backwards_clamps_duration() {
        let window = vec![sample_at(10, Emotion::Happy), sample_at(0, Emotion::Sad)];
        let stats = compute(&window).unwrap();
        assert_eq!(stats.session_duration, 0.0);
        assert_eq!(stats.transition_probability(Emotion::Happy, Emotion::Sad), 1.0);
    }

    #[test]
    fn test_most_frequent_breaks_ties_by_label_order() {
        let window = sequence(&[Emotion::Sad, Emotion::Happy, Emotion::Sad, Emotion::Happy]);
        let stats = compute(&window).unwrap();
        assert_eq!(stats.most_frequent(), Some(Emotion::Happy));
    }

    #[test]
    fn test_window_selection() {
        let history: Vec<u32> = (0..10).collect();
        assert_eq!(Window::All.apply(&history).len(), 10);
        assert_eq!(Window::Last(3).apply(&history), &[7, 8, 9]);
        assert_eq!(Window::Last(50).apply(&history).len(), 10);
        assert_eq!(Window::from_rows(0), Window::All);
        assert_eq!(Window::from_rows(500), Window::Last(500));
    }
}
