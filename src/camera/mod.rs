//! Frame sources: the V4L2 webcam and a synthetic stand-in

mod builder;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod device;
mod synthetic;
#[cfg(test)]
mod tests;

use crate::error::{CameraError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;

pub use builder::CameraOpenerBuilder;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use device::{DeviceCamera, DeviceOpener};
pub use synthetic::{render_synthetic_frame, SyntheticCamera, SyntheticOpener};

/// An opened camera delivering RGB frames
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next frame. `Ok(None)` means the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<FrameData>>;

    /// Give the device back. Further reads fail.
    async fn release(&mut self);

    fn describe(&self) -> String;
}

/// Acquires a fresh [`FrameSource`] for each sampling run
#[async_trait]
pub trait CameraOpener: Send + Sync {
    async fn open(&self) -> std::result::Result<Box<dyn FrameSource>, CameraError>;

    fn device_name(&self) -> String;
}
