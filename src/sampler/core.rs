use super::live::{LiveSnapshot, LiveView};
use super::overlay::Annotator;
use crate::camera::{CameraOpener, FrameSource};
use crate::config::SamplerConfig;
use crate::detector::{EmotionClassifier, FaceLocator};
use crate::emotion::{EmotionSample, EmotionVector};
use crate::error::{CameraError, ClassificationError};
use crate::events::{EventBus, MoodcamEvent, StopReason};
use crate::frame::{BoundingBox, FrameData};
use crate::sample_buffer::SampleBuffer;
use chrono::Utc;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// How long `stop()` waits for the sampling task before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

const IDLE: u64 = 0;

/// Counters across all sampling runs
#[derive(Debug, Default)]
struct SamplerCounters {
    sessions: AtomicU64,
    frames_read: AtomicU64,
    frame_errors: AtomicU64,
    faces_found: AtomicU64,
    samples_produced: AtomicU64,
    classifications_defaulted: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SamplerStats {
    pub sessions: u64,
    pub frames_read: u64,
    pub frame_errors: u64,
    pub faces_found: u64,
    pub samples_produced: u64,
    pub classifications_defaulted: u64,
}

impl SamplerCounters {
    fn snapshot(&self) -> SamplerStats {
        SamplerStats {
            sessions: self.sessions.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            faces_found: self.faces_found.load(Ordering::Relaxed),
            samples_produced: self.samples_produced.load(Ordering::Relaxed),
            classifications_defaulted: self.classifications_defaulted.load(Ordering::Relaxed),
        }
    }
}

struct RunHandle {
    generation: u64,
    session_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Producer loop turning camera frames into emotion samples.
///
/// Idle until `start()` opens the camera; a background task then samples
/// at a fixed minimum interval until `stop()` or end of stream, releasing
/// the camera on the way out.
pub struct SamplingLoop {
    opener: Arc<dyn CameraOpener>,
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    annotator: Arc<Annotator>,
    buffer: Arc<SampleBuffer>,
    live: Arc<LiveView>,
    event_bus: EventBus,
    interval: Duration,
    run: Mutex<Option<RunHandle>>,
    /// Generation of the session currently sampling, 0 when idle
    active: Arc<AtomicU64>,
    counters: Arc<SamplerCounters>,
}

impl SamplingLoop {
    pub fn new(
        opener: Arc<dyn CameraOpener>,
        locator: Arc<dyn FaceLocator>,
        classifier: Arc<dyn EmotionClassifier>,
        buffer: Arc<SampleBuffer>,
        event_bus: EventBus,
        config: &SamplerConfig,
    ) -> Self {
        let interval = config.interval();
        info!(
            "Creating sampling loop for {} every {:?}",
            opener.device_name(),
            interval
        );

        Self {
            opener,
            locator,
            classifier,
            annotator: Arc::new(Annotator::from_config(config)),
            buffer,
            live: Arc::new(LiveView::new()),
            event_bus,
            interval,
            run: Mutex::new(None),
            active: Arc::new(AtomicU64::new(IDLE)),
            counters: Arc::new(SamplerCounters::default()),
        }
    }

    /// Open the camera and begin sampling. A no-op while already running.
    ///
    /// Fails with [`CameraError::Unavailable`] when the device cannot be
    /// opened; the loop then stays idle.
    pub async fn start(&self) -> Result<(), CameraError> {
        let mut run = self.run.lock().await;

        if let Some(handle) = run.as_ref() {
            if !handle.task.is_finished() {
                debug!("Sampling already running (session {})", handle.session_id);
                return Ok(());
            }
        }
        // A run that ended on its own has already released the camera
        if let Some(finished) = run.take() {
            let _ = finished.task.await;
        }

        let source = self.opener.open().await.map_err(|e| {
            warn!("Could not start sampling: {}", e);
            e
        })?;

        let session_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let generation = self.counters.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.store(generation, Ordering::SeqCst);

        let worker = SamplingWorker {
            source,
            locator: Arc::clone(&self.locator),
            classifier: Arc::clone(&self.classifier),
            annotator: Arc::clone(&self.annotator),
            buffer: Arc::clone(&self.buffer),
            live: Arc::clone(&self.live),
            event_bus: self.event_bus.clone(),
            interval: self.interval,
            cancel: cancel.clone(),
            active: Arc::clone(&self.active),
            generation,
            counters: Arc::clone(&self.counters),
            session_id: session_id.clone(),
            produced: 0,
        };

        let _ = self.event_bus.publish(MoodcamEvent::SamplingStarted {
            session_id: session_id.clone(),
            timestamp: SystemTime::now(),
        });

        let task = tokio::spawn(worker.run());
        *run = Some(RunHandle {
            generation,
            session_id,
            cancel,
            task,
        });

        Ok(())
    }

    /// Stop sampling and wait for the camera to be released. Idempotent.
    ///
    /// The run lock is held until the worker is gone, so a concurrent
    /// `start()` only opens the camera after it has been released.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(mut handle) = run.take() else {
            debug!("Sampling loop is not running");
            return;
        };

        info!("Stopping sampling session {}", handle.session_id);
        handle.cancel.cancel();

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle.task).await {
            Ok(Ok(())) => debug!("Sampling task completed"),
            Ok(Err(e)) => error!("Sampling task failed: {}", e),
            Err(_) => {
                warn!(
                    "Sampling task did not finish within {:?}, aborting",
                    STOP_TIMEOUT
                );
                handle.task.abort();
                let _ = handle.task.await;
            }
        }

        let _ = self.active.compare_exchange(
            handle.generation,
            IDLE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.live.clear_emotions();
        drop(run);
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst) != IDLE
    }

    /// Newest (annotated) frame, if any was captured
    pub fn current_frame(&self) -> Option<FrameData> {
        self.live.current_frame()
    }

    /// Emotions read from the newest frame; `None` when it showed no face
    pub fn current_emotions(&self) -> Option<EmotionVector> {
        self.live.current_emotions()
    }

    pub fn live_snapshot(&self) -> Option<Arc<LiveSnapshot>> {
        self.live.snapshot()
    }

    pub fn stats(&self) -> SamplerStats {
        self.counters.snapshot()
    }
}

/// Result of the blocking part of one cycle
struct CycleOutcome {
    display: FrameData,
    detection: Option<BoundingBox>,
    emotions: Option<EmotionVector>,
    classification_error: Option<ClassificationError>,
}

/// State owned by one sampling run
struct SamplingWorker {
    source: Box<dyn FrameSource>,
    locator: Arc<dyn FaceLocator>,
    classifier: Arc<dyn EmotionClassifier>,
    annotator: Arc<Annotator>,
    buffer: Arc<SampleBuffer>,
    live: Arc<LiveView>,
    event_bus: EventBus,
    interval: Duration,
    cancel: CancellationToken,
    active: Arc<AtomicU64>,
    generation: u64,
    counters: Arc<SamplerCounters>,
    session_id: String,
    produced: u64,
}

impl SamplingWorker {
    async fn run(mut self) {
        info!(
            "Sampling session {} started on {}",
            self.session_id,
            self.source.describe()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Requested,
                _ = ticker.tick() => {}
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StopReason::Requested,
                next = self.source.next_frame() => next,
            };

            match next {
                Ok(Some(frame)) => self.sample(frame).await,
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => {
                    self.counters.frame_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Frame read failed, skipping cycle: {}", e);
                }
            }
        };

        self.source.release().await;
        if reason == StopReason::EndOfStream {
            self.live.clear_emotions();
        }
        // Only this run's own session may be marked idle
        let _ = self.active.compare_exchange(
            self.generation,
            IDLE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        info!(
            "Sampling session {} ended ({:?}) after {} samples",
            self.session_id, reason, self.produced
        );
        let _ = self.event_bus.publish(MoodcamEvent::SamplingStopped {
            session_id: self.session_id.clone(),
            reason,
            samples_produced: self.produced,
            timestamp: SystemTime::now(),
        });
    }

    async fn sample(&mut self, frame: FrameData) {
        self.counters.frames_read.fetch_add(1, Ordering::Relaxed);

        let locator = Arc::clone(&self.locator);
        let classifier = Arc::clone(&self.classifier);
        let annotator = Arc::clone(&self.annotator);
        let frame_id = frame.id;
        let raw = frame.clone();

        let analysis = tokio::task::spawn_blocking(move || {
            analyze(frame, locator.as_ref(), classifier.as_ref(), annotator.as_ref())
        });

        // A stop request does not wait for inference in flight; the result
        // is dropped when the blocking call eventually returns.
        let joined = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Discarding analysis of frame {} on stop", frame_id);
                return;
            }
            joined = analysis => joined,
        };

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                self.counters.frame_errors.fetch_add(1, Ordering::Relaxed);
                error!("Analysis of frame {} failed: {}", frame_id, e);
                self.live.publish(LiveSnapshot {
                    frame: raw,
                    detection: None,
                    emotions: None,
                    captured_at: Utc::now(),
                });
                return;
            }
        };

        let captured_at = Utc::now();

        if let Some(emotions) = outcome.emotions {
            self.counters.faces_found.fetch_add(1, Ordering::Relaxed);

            if let Some(e) = outcome.classification_error {
                self.counters
                    .classifications_defaulted
                    .fetch_add(1, Ordering::Relaxed);
                debug!("Classification failed on frame {}: {}", frame_id, e);
                let _ = self.event_bus.publish(MoodcamEvent::ClassificationDefaulted {
                    error: e.to_string(),
                });
            }

            let sample = EmotionSample::new(captured_at, emotions);
            trace!(
                "Frame {}: {} ({:.2})",
                frame_id,
                sample.dominant_emotion(),
                sample.confidence()
            );
            let _ = self.event_bus.publish(MoodcamEvent::SampleProduced {
                dominant: sample.dominant_emotion(),
                confidence: sample.confidence(),
                timestamp: SystemTime::now(),
            });
            self.buffer.push(sample);
            self.produced += 1;
            self.counters.samples_produced.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!("No face in frame {}", frame_id);
        }

        self.live.publish(LiveSnapshot {
            frame: outcome.display,
            detection: outcome.detection,
            emotions: outcome.emotions,
            captured_at,
        });
    }
}

/// Locate, crop, classify and annotate one frame. Blocking.
fn analyze(
    frame: FrameData,
    locator: &dyn FaceLocator,
    classifier: &dyn EmotionClassifier,
    annotator: &Annotator,
) -> CycleOutcome {
    let Some(region) = locator.locate(&frame) else {
        return CycleOutcome {
            display: frame,
            detection: None,
            emotions: None,
            classification_error: None,
        };
    };

    let classified = frame
        .crop(region)
        .map_err(|e| ClassificationError::Failed {
            details: e.to_string(),
        })
        .and_then(|face| {
            catch_unwind(AssertUnwindSafe(|| classifier.classify(&face))).unwrap_or_else(
                |panic| {
                    Err(ClassificationError::Failed {
                        details: panic_message(panic.as_ref()),
                    })
                },
            )
        });

    let (emotions, classification_error) = match classified {
        Ok(emotions) => (emotions, None),
        Err(e) => (EmotionVector::neutral(), Some(e)),
    };

    CycleOutcome {
        display: annotator.annotate(&frame, Some(region), Some(&emotions)),
        detection: Some(region),
        emotions: Some(emotions),
        classification_error,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .map(|m| m.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("classifier panicked: {}", message)
}
