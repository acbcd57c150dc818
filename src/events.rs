use crate::emotion::Emotion;
use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Why a sampling run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    /// The frame source reported end of stream
    EndOfStream,
}

/// Events that can occur in the moodcam system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MoodcamEvent {
    /// Sampling loop acquired the camera and began a new session
    SamplingStarted {
        session_id: String,
        timestamp: SystemTime,
    },
    /// Sampling loop released the camera
    SamplingStopped {
        session_id: String,
        reason: StopReason,
        samples_produced: u64,
        timestamp: SystemTime,
    },
    /// A face was classified and a sample was queued
    SampleProduced {
        dominant: Emotion,
        confidence: f64,
        timestamp: SystemTime,
    },
    /// Classification failed and the neutral fallback was recorded
    ClassificationDefaulted { error: String },
    /// A batch of samples reached the record store
    SamplesPersisted { count: usize, total: usize },
    /// Persisting a batch failed; the batch stays pending
    StorageFailed { error: String, pending: usize },
    /// Statistics were recomputed over the configured window
    StatisticsUpdated { total_count: usize },
    /// Operator asked to flip sampling on or off
    SamplingToggleRequested,
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl MoodcamEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MoodcamEvent::SamplingStarted { session_id, .. } => {
                format!("Sampling started (session {})", session_id)
            }
            MoodcamEvent::SamplingStopped {
                session_id,
                reason,
                samples_produced,
                ..
            } => format!(
                "Sampling stopped (session {}, {:?}, {} samples)",
                session_id, reason, samples_produced
            ),
            MoodcamEvent::SampleProduced {
                dominant,
                confidence,
                ..
            } => format!("Sample: {} ({:.2})", dominant, confidence),
            MoodcamEvent::ClassificationDefaulted { error } => {
                format!("Classification defaulted to neutral: {}", error)
            }
            MoodcamEvent::SamplesPersisted { count, total } => {
                format!("Persisted {} samples ({} total)", count, total)
            }
            MoodcamEvent::StorageFailed { error, pending } => {
                format!("Storage failed with {} pending: {}", pending, error)
            }
            MoodcamEvent::StatisticsUpdated { total_count } => {
                format!("Statistics updated over {} samples", total_count)
            }
            MoodcamEvent::SamplingToggleRequested => "Sampling toggle requested".to_string(),
            MoodcamEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            MoodcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MoodcamEvent::SamplingStarted { .. } => "sampling_started",
            MoodcamEvent::SamplingStopped { .. } => "sampling_stopped",
            MoodcamEvent::SampleProduced { .. } => "sample_produced",
            MoodcamEvent::ClassificationDefaulted { .. } => "classification_defaulted",
            MoodcamEvent::SamplesPersisted { .. } => "samples_persisted",
            MoodcamEvent::StorageFailed { .. } => "storage_failed",
            MoodcamEvent::StatisticsUpdated { .. } => "statistics_updated",
            MoodcamEvent::SamplingToggleRequested => "sampling_toggle_requested",
            MoodcamEvent::SystemError { .. } => "system_error",
            MoodcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MoodcamEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let mut bus = Self::new(capacity);
        bus.debug_logging = true;
        bus
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<MoodcamEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails when nobody is subscribed; most publishers ignore that.
    pub fn publish(&self, event: MoodcamEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            MoodcamEvent::SamplingStarted { .. } | MoodcamEvent::SamplingStopped { .. } => {
                info!("{}", event.description());
            }
            MoodcamEvent::StorageFailed { .. } | MoodcamEvent::ClassificationDefaulted { .. } => {
                warn!("{}", event.description());
            }
            MoodcamEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            MoodcamEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &MoodcamEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Receiver that skips events not matching its filter
pub struct EventReceiver {
    receiver: broadcast::Receiver<MoodcamEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<MoodcamEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next matching event. Lagging is logged and skipped over.
    pub async fn recv(&mut self) -> Result<MoodcamEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
