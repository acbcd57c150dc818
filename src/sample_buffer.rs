use crate::emotion::EmotionSample;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::trace;

/// Unbounded FIFO hand-off between the sampling loop and the driver.
///
/// `push` never blocks beyond a short critical section and `drain_all`
/// takes the whole queue in one swap, so no sample is lost or duplicated
/// when the two race.
pub struct SampleBuffer {
    queue: Mutex<Vec<EmotionSample>>,
    stats: SampleBufferStats,
}

/// Counters for buffer monitoring
#[derive(Debug)]
pub struct SampleBufferStats {
    pub samples_pushed: AtomicU64,
    pub samples_drained: AtomicU64,
    pub drain_calls: AtomicU64,
    pub peak_depth: AtomicUsize,
}

impl SampleBufferStats {
    fn new() -> Self {
        Self {
            samples_pushed: AtomicU64::new(0),
            samples_drained: AtomicU64::new(0),
            drain_calls: AtomicU64::new(0),
            peak_depth: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> SampleBufferStatsSnapshot {
        SampleBufferStatsSnapshot {
            samples_pushed: self.samples_pushed.load(Ordering::Relaxed),
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
            drain_calls: self.drain_calls.load(Ordering::Relaxed),
            peak_depth: self.peak_depth.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SampleBufferStatsSnapshot {
    pub samples_pushed: u64,
    pub samples_drained: u64,
    pub drain_calls: u64,
    pub peak_depth: usize,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            stats: SampleBufferStats::new(),
        }
    }

    /// Enqueue a sample. Always succeeds.
    pub fn push(&self, sample: EmotionSample) {
        let depth = {
            let mut queue = self.queue.lock();
            queue.push(sample);
            queue.len()
        };

        self.stats.samples_pushed.fetch_add(1, Ordering::Relaxed);
        self.stats.peak_depth.fetch_max(depth, Ordering::Relaxed);
        trace!("Queued sample, buffer depth {}", depth);
    }

    /// Remove and return every queued sample in arrival order
    pub fn drain_all(&self) -> Vec<EmotionSample> {
        let drained = std::mem::take(&mut *self.queue.lock());

        self.stats.drain_calls.fetch_add(1, Ordering::Relaxed);
        self.stats
            .samples_drained
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        if !drained.is_empty() {
            trace!("Drained {} samples", drained.len());
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SampleBufferStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{Emotion, EmotionVector};
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn sample(seq: i64) -> EmotionSample {
        EmotionSample::new(
            Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
            EmotionVector::from_pairs([(Emotion::Happy, 0.9)]),
        )
    }

    #[test]
    fn test_drain_returns_push_order_then_empty() {
        let buffer = SampleBuffer::new();
        for i in 0..5 {
            buffer.push(sample(i));
        }

        let batch = buffer.drain_all();
        let seconds: Vec<i64> = batch.iter().map(|s| s.timestamp().timestamp()).collect();
        assert_eq!(
            seconds,
            (0..5).map(|i| 1_700_000_000 + i).collect::<Vec<_>>()
        );

        assert!(buffer.drain_all().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_on_empty_buffer() {
        let buffer = SampleBuffer::default();
        assert!(buffer.drain_all().is_empty());
        assert_eq!(buffer.stats().drain_calls, 1);
    }

    #[test]
    fn test_stats_track_depth() {
        let buffer = SampleBuffer::new();
        buffer.push(sample(0));
        buffer.push(sample(1));
        buffer.drain_all();
        buffer.push(sample(2));

        let stats = buffer.stats();
        assert_eq!(stats.samples_pushed, 3);
        assert_eq!(stats.samples_drained, 2);
        assert_eq!(stats.peak_depth, 2);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_concurrent_push_and_drain_loses_nothing() {
        let buffer = Arc::new(SampleBuffer::new());
        let total = 2_000;

        let producer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..total {
                    buffer.push(sample(i));
                }
            })
        };

        let mut collected = Vec::new();
        while !producer.is_finished() {
            collected.extend(buffer.drain_all());
            std::thread::yield_now();
        }
        producer.join().unwrap();
        collected.extend(buffer.drain_all());

        assert_eq!(collected.len(), total as usize);
        let unique: HashSet<i64> = collected.iter().map(|s| s.timestamp().timestamp()).collect();
        assert_eq!(unique.len(), total as usize);

        // Arrival order survives across drains
        assert!(collected
            .windows(2)
            .all(|pair| pair[0].timestamp() < pair[1].timestamp()));
    }
}
