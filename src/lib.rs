pub mod app;
pub mod camera;
pub mod config;
pub mod detector;
pub mod driver;
pub mod emotion;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod sample_buffer;
pub mod sampler;
pub mod statistics;
pub mod storage;

#[cfg(feature = "http_api")]
pub mod api;

pub use app::{ComponentState, MonitorHandle, MoodcamOrchestrator, ShutdownReason};
pub use camera::{CameraOpener, CameraOpenerBuilder, FrameSource};
pub use config::MoodcamConfig;
pub use detector::{EmotionClassifier, FaceLocator};
pub use driver::{AnalyticsDriver, CycleReport};
pub use emotion::{Emotion, EmotionSample, EmotionVector};
pub use error::{MoodcamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, MoodcamEvent};
pub use frame::{BoundingBox, FrameData};
pub use sample_buffer::SampleBuffer;
pub use sampler::SamplingLoop;
pub use statistics::{Statistics, Window};
pub use storage::RecordStore;

#[cfg(feature = "http_api")]
pub use api::ApiServer;
