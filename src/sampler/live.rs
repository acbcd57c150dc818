use crate::emotion::EmotionVector;
use crate::frame::{BoundingBox, FrameData};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Latest frame and the emotions read from it, published together
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub frame: FrameData,
    pub detection: Option<BoundingBox>,
    /// `None` when no face was found in `frame`
    pub emotions: Option<EmotionVector>,
    pub captured_at: DateTime<Utc>,
}

/// Tear-free hand-off of the newest snapshot to readers
#[derive(Default)]
pub struct LiveView {
    latest: RwLock<Option<Arc<LiveSnapshot>>>,
}

impl LiveView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: LiveSnapshot) {
        *self.latest.write() = Some(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Option<Arc<LiveSnapshot>> {
        self.latest.read().clone()
    }

    pub fn current_frame(&self) -> Option<FrameData> {
        self.snapshot().map(|snapshot| snapshot.frame.clone())
    }

    pub fn current_emotions(&self) -> Option<EmotionVector> {
        self.snapshot().and_then(|snapshot| snapshot.emotions)
    }

    /// Keep the last frame but drop its reading; used once sampling ends
    pub fn clear_emotions(&self) {
        let mut latest = self.latest.write();
        if let Some(snapshot) = latest.as_ref() {
            if snapshot.emotions.is_some() || snapshot.detection.is_some() {
                let mut cleared = LiveSnapshot::clone(snapshot);
                cleared.emotions = None;
                cleared.detection = None;
                *latest = Some(Arc::new(cleared));
            }
        }
    }
}
