use crate::driver::AnalyticsDriver;
use crate::emotion::{EmotionSample, EmotionVector};
use crate::error::{CameraError, StorageError};
use crate::frame::FrameData;
use crate::sample_buffer::{SampleBuffer, SampleBufferStatsSnapshot};
use crate::sampler::{LiveSnapshot, SamplerStats, SamplingLoop};
use crate::statistics::{Statistics, Window};
use crate::storage::RecordStoreStatsSnapshot;
use std::sync::Arc;
use tracing::info;

/// Cloneable view of the running system for the dashboard, HTTP API and
/// keyboard control
#[derive(Clone)]
pub struct MonitorHandle {
    sampler: Arc<SamplingLoop>,
    driver: Arc<AnalyticsDriver>,
    buffer: Arc<SampleBuffer>,
}

impl MonitorHandle {
    pub fn new(
        sampler: Arc<SamplingLoop>,
        driver: Arc<AnalyticsDriver>,
        buffer: Arc<SampleBuffer>,
    ) -> Self {
        Self {
            sampler,
            driver,
            buffer,
        }
    }

    pub async fn start(&self) -> Result<(), CameraError> {
        self.sampler.start().await
    }

    pub async fn stop(&self) {
        self.sampler.stop().await
    }

    /// Flip sampling on or off. Returns whether sampling is now running.
    pub async fn toggle(&self) -> Result<bool, CameraError> {
        if self.sampler.is_running() {
            info!("Toggling sampling off");
            self.sampler.stop().await;
            Ok(false)
        } else {
            info!("Toggling sampling on");
            self.sampler.start().await?;
            Ok(true)
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }

    pub fn current_frame(&self) -> Option<FrameData> {
        self.sampler.current_frame()
    }

    pub fn current_emotions(&self) -> Option<EmotionVector> {
        self.sampler.current_emotions()
    }

    pub fn live_snapshot(&self) -> Option<Arc<LiveSnapshot>> {
        self.sampler.live_snapshot()
    }

    /// Statistics over `window` of the persisted history; `None` when empty
    pub fn statistics(&self, window: Window) -> Option<Statistics> {
        self.driver.statistics(window)
    }

    /// Statistics over the configured window as of the last driver cycle
    pub fn latest_statistics(&self) -> Option<Arc<Statistics>> {
        self.driver.latest_statistics()
    }

    pub fn default_window(&self) -> Window {
        self.driver.default_window()
    }

    pub fn recent_samples(&self, count: usize) -> Vec<EmotionSample> {
        self.driver.recent_samples(count)
    }

    /// Persist every pending sample now, ignoring the batch threshold
    pub async fn save(&self) -> Result<usize, StorageError> {
        self.driver.flush().await
    }

    pub fn persisted_count(&self) -> usize {
        self.driver.history_len()
    }

    pub fn pending_count(&self) -> usize {
        self.driver.pending_len() + self.buffer.len()
    }

    pub fn sampler_stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    pub fn buffer_stats(&self) -> SampleBufferStatsSnapshot {
        self.buffer.stats()
    }

    pub fn store_stats(&self) -> RecordStoreStatsSnapshot {
        self.driver.store().stats()
    }
}
