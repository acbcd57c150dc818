//! Periodic drain → persist → recompute cycle behind the dashboard

use crate::config::{DashboardConfig, StorageConfig};
use crate::emotion::EmotionSample;
use crate::error::StorageError;
use crate::events::{EventBus, MoodcamEvent};
use crate::sample_buffer::SampleBuffer;
use crate::statistics::{self, Statistics, Window};
use crate::storage::RecordStore;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single driver cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Samples taken from the buffer this cycle
    pub drained: usize,
    /// Samples appended to the record store this cycle
    pub persisted: usize,
    /// Samples still waiting to be persisted
    pub pending: usize,
}

/// Moves samples from the buffer into the record store and keeps
/// statistics over the persisted history current.
///
/// Statistics only ever cover rows that reached the store, so a reader
/// never sees a sample that a crash could still lose.
pub struct AnalyticsDriver {
    buffer: Arc<SampleBuffer>,
    store: Arc<RecordStore>,
    event_bus: EventBus,
    auto_save: bool,
    batch_size: usize,
    refresh: Duration,
    default_window: Window,
    pending: Mutex<Vec<EmotionSample>>,
    persist_lock: tokio::sync::Mutex<()>,
    history: RwLock<Vec<EmotionSample>>,
    latest: RwLock<Option<Arc<Statistics>>>,
}

impl AnalyticsDriver {
    pub fn new(
        buffer: Arc<SampleBuffer>,
        store: Arc<RecordStore>,
        event_bus: EventBus,
        storage: &StorageConfig,
        dashboard: &DashboardConfig,
    ) -> Self {
        Self {
            buffer,
            store,
            event_bus,
            auto_save: storage.auto_save,
            batch_size: storage.batch_size.max(1),
            refresh: dashboard.refresh_interval(),
            default_window: Window::from_rows(dashboard.window_rows),
            pending: Mutex::new(Vec::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            history: RwLock::new(Vec::new()),
            latest: RwLock::new(None),
        }
    }

    /// Seed the history from the record store. An unreadable or missing
    /// log counts as no data yet.
    pub async fn load_history(&self) -> usize {
        let loaded = match self.store.load_report().await {
            Ok(report) => {
                if report.skipped_rows > 0 {
                    warn!(
                        "Ignored {} unreadable rows in {}",
                        report.skipped_rows,
                        self.store.path().display()
                    );
                }
                report.samples
            }
            Err(e) => {
                warn!("Starting with empty history: {}", e);
                Vec::new()
            }
        };

        let count = loaded.len();
        *self.history.write() = loaded;
        info!(
            "Loaded {} samples from {}",
            count,
            self.store.path().display()
        );
        self.recompute();
        count
    }

    /// Drain the buffer and persist once enough samples are pending
    pub async fn cycle(&self) -> CycleReport {
        self.persist(false).await
    }

    /// Persist everything pending regardless of batch size or auto-save
    pub async fn flush(&self) -> Result<usize, StorageError> {
        let _guard = self.persist_lock.lock().await;
        let batch = self.take_batch(true);
        if batch.is_empty() {
            return Ok(0);
        }
        self.append_batch(batch).await
    }

    async fn persist(&self, force: bool) -> CycleReport {
        let _guard = self.persist_lock.lock().await;
        let drained_before = self.pending.lock().len();
        let batch = self.take_batch(force);
        let drained = self.pending.lock().len() - drained_before;

        let persisted = if batch.is_empty() {
            0
        } else {
            self.append_batch(batch).await.unwrap_or(0)
        };

        CycleReport {
            drained,
            persisted,
            pending: self.pending.lock().len(),
        }
    }

    /// Move buffered samples to pending; return a copy of pending if it
    /// should be written now
    fn take_batch(&self, force: bool) -> Vec<EmotionSample> {
        let mut pending = self.pending.lock();
        pending.extend(self.buffer.drain_all());

        let due = force || (self.auto_save && pending.len() >= self.batch_size);
        if due {
            pending.clone()
        } else {
            Vec::new()
        }
    }

    /// Caller holds `persist_lock`, so `batch` is still the head of pending
    async fn append_batch(&self, batch: Vec<EmotionSample>) -> Result<usize, StorageError> {
        match self.store.append(&batch).await {
            Ok(()) => {
                let count = batch.len();
                self.pending.lock().drain(..count);
                let total = {
                    let mut history = self.history.write();
                    history.extend(batch);
                    history.len()
                };
                debug!("Persisted {} samples ({} total)", count, total);
                let _ = self
                    .event_bus
                    .publish(MoodcamEvent::SamplesPersisted { count, total });
                self.recompute();
                Ok(count)
            }
            Err(e) => {
                let pending = self.pending.lock().len();
                warn!("Keeping {} samples pending: {}", pending, e);
                let _ = self.event_bus.publish(MoodcamEvent::StorageFailed {
                    error: e.to_string(),
                    pending,
                });
                Err(e)
            }
        }
    }

    fn recompute(&self) {
        let stats = {
            let history = self.history.read();
            statistics::compute(self.default_window.apply(history.as_slice()))
        };

        if let Some(stats) = &stats {
            let _ = self.event_bus.publish(MoodcamEvent::StatisticsUpdated {
                total_count: stats.total_count,
            });
        }
        *self.latest.write() = stats.map(Arc::new);
    }

    /// Statistics over `window` of the persisted history
    pub fn statistics(&self, window: Window) -> Option<Statistics> {
        let history = self.history.read();
        statistics::compute(window.apply(history.as_slice()))
    }

    /// Statistics over the configured window as of the last cycle
    pub fn latest_statistics(&self) -> Option<Arc<Statistics>> {
        self.latest.read().clone()
    }

    /// The trailing `count` persisted samples
    pub fn recent_samples(&self, count: usize) -> Vec<EmotionSample> {
        Window::Last(count)
            .apply(self.history.read().as_slice())
            .to_vec()
    }

    pub fn default_window(&self) -> Window {
        self.default_window
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Cycle on the refresh interval until cancelled, then flush
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Analytics driver running every {:?}", self.refresh);

        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.cycle().await;
                    if report.drained > 0 || report.persisted > 0 {
                        debug!(
                            "Driver cycle: drained {}, persisted {}, pending {}",
                            report.drained, report.persisted, report.pending
                        );
                    }
                }
            }
        }

        match self.flush().await {
            Ok(0) => {}
            Ok(count) => info!("Flushed {} samples on shutdown", count),
            Err(e) => error!(
                "Lost {} unsaved samples on shutdown: {}",
                self.pending_len(),
                e
            ),
        }
        info!("Analytics driver stopped");
    }
}
