use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoodcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[cfg(feature = "http_api")]
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl MoodcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Camera acquisition and frame delivery failures
#[derive(Error, Debug)]
pub enum CameraError {
    /// The device could not be opened. Fatal to `start()`, retryable later.
    #[error("Camera {device} unavailable: {details}")]
    Unavailable { device: String, details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Camera stream error: {details}")]
    Stream { details: String },
}

/// Transient inference failures. Recovered inside the sampling loop.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Classifier failed: {details}")]
    Failed { details: String },

    #[error("Classifier produced unusable output: {details}")]
    InvalidOutput { details: String },

    #[error("Classifier did not answer within {millis}ms")]
    Timeout { millis: u64 },

    #[error("No classifier configured")]
    Unconfigured,
}

/// Record store failures
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized log schema in {path}: {details}")]
    Schema { path: PathBuf, details: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus closed")]
    ChannelClosed,
}

#[cfg(feature = "http_api")]
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("API server failed: {details}")]
    ServerFailed { details: String },
}

pub type Result<T> = std::result::Result<T, MoodcamError>;
