use super::handle::MonitorHandle;
use super::types::{ComponentState, ShutdownReason};
use crate::camera::CameraOpenerBuilder;
use crate::config::MoodcamConfig;
use crate::detector::{build_classifier, build_locator};
use crate::driver::AnalyticsDriver;
use crate::error::Result;
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::sample_buffer::SampleBuffer;
use crate::sampler::SamplingLoop;
use crate::storage::RecordStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator that wires the sampling pipeline together
/// and owns its lifecycle
pub struct MoodcamOrchestrator {
    pub(super) config: MoodcamConfig,
    pub(super) event_bus: EventBus,

    // Components
    pub(super) sampler: Arc<SamplingLoop>,
    pub(super) driver: Arc<AnalyticsDriver>,
    pub(super) handle: MonitorHandle,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) background_tasks: Vec<(&'static str, JoinHandle<()>)>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl MoodcamOrchestrator {
    /// Create a new orchestrator with the given configuration
    pub async fn new(config: MoodcamConfig) -> Result<Self> {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let opener = CameraOpenerBuilder::new()
            .config(config.camera.clone())
            .build()?;
        let locator = build_locator(&config.detector);
        let classifier = build_classifier(&config.detector);

        let buffer = Arc::new(SampleBuffer::new());
        let sampler = Arc::new(SamplingLoop::new(
            opener,
            locator,
            classifier,
            Arc::clone(&buffer),
            event_bus.clone(),
            &config.sampler,
        ));

        let store = Arc::new(RecordStore::new(config.storage.path()));
        info!("Recording samples to {}", store.path().display());
        let driver = Arc::new(AnalyticsDriver::new(
            Arc::clone(&buffer),
            store,
            event_bus.clone(),
            &config.storage,
            &config.dashboard,
        ));

        let handle = MonitorHandle::new(Arc::clone(&sampler), Arc::clone(&driver), buffer);

        // Keyboard control stays off unless enabled via set_keyboard_enabled()
        let keyboard_handler = Some(KeyboardInputHandler::new(
            event_bus.clone(),
            handle.clone(),
        ));

        Ok(Self {
            config,
            event_bus,
            sampler,
            driver,
            handle,
            keyboard_handler,
            keyboard_enabled: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            background_tasks: Vec::new(),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Handle for live reads and sampling control
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &MoodcamConfig {
        &self.config
    }
}
