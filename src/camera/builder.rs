use super::{CameraOpener, SyntheticOpener};
use crate::config::{CameraConfig, CameraSource};
use crate::error::{MoodcamError, Result};
use std::sync::Arc;

/// Picks the camera opener matching the configured source
pub struct CameraOpenerBuilder {
    config: Option<CameraConfig>,
}

impl CameraOpenerBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Arc<dyn CameraOpener>> {
        let config = self
            .config
            .ok_or_else(|| MoodcamError::system("Camera configuration must be specified"))?;

        match config.source {
            CameraSource::Synthetic => Ok(Arc::new(SyntheticOpener::new(config))),
            CameraSource::Device => device_opener(config),
        }
    }
}

impl Default for CameraOpenerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn device_opener(config: CameraConfig) -> Result<Arc<dyn CameraOpener>> {
    Ok(Arc::new(super::DeviceOpener::new(config)))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn device_opener(_config: CameraConfig) -> Result<Arc<dyn CameraOpener>> {
    Err(crate::error::CameraError::Configuration {
        details: "Built without webcam support; use source = \"synthetic\"".to_string(),
    }
    .into())
}
