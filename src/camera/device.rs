use super::{CameraOpener, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, MoodcamError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

/// How long a single frame wait may take before it counts as a stream error
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);
/// Time allowed for the device to reach the playing state
const START_TIMEOUT_SECONDS: u64 = 5;

/// GStreamer V4L2 webcam converted to packed RGB
pub struct DeviceCamera {
    pipeline: Pipeline,
    appsink: AppSink,
    device: String,
    frame_counter: u64,
    released: bool,
}

impl DeviceCamera {
    /// Open the device and bring the pipeline to playing. Blocking.
    pub fn open(config: &CameraConfig) -> std::result::Result<Self, CameraError> {
        let device = format!("/dev/video{}", config.index);
        info!(
            "Opening camera {} ({}x{} @ {}fps)",
            device, config.resolution.0, config.resolution.1, config.fps
        );

        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = build_pipeline_string(config);
        debug!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::Unavailable {
                device,
                details: e.to_string(),
            });
        }

        let (state_change, _, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECONDS));
        if let Err(e) = state_change {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::Unavailable {
                device,
                details: format!("Pipeline failed to start: {}", e),
            });
        }

        info!("Camera {} streaming", device);
        Ok(Self {
            pipeline,
            appsink,
            device,
            frame_counter: 0,
            released: false,
        })
    }

    fn shutdown_pipeline(&mut self) {
        if !self.released {
            if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop pipeline for {}: {}", self.device, e);
            }
            self.released = true;
        }
    }
}

#[async_trait]
impl FrameSource for DeviceCamera {
    async fn next_frame(&mut self) -> Result<Option<FrameData>> {
        if self.released {
            return Err(CameraError::Stream {
                details: format!("{} already released", self.device),
            }
            .into());
        }

        let appsink = self.appsink.clone();
        let sample = tokio::task::spawn_blocking(move || {
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(
                FRAME_TIMEOUT.as_millis() as u64,
            ))
        })
        .await
        .map_err(|e| MoodcamError::system(format!("Frame wait task failed: {}", e)))?;

        match sample {
            Some(sample) => {
                let frame_id = self.frame_counter;
                self.frame_counter += 1;
                Ok(Some(sample_to_frame(&sample, frame_id)?))
            }
            None if self.appsink.is_eos() => {
                info!("Camera {} reached end of stream", self.device);
                Ok(None)
            }
            None => Err(CameraError::Stream {
                details: format!("No frame from {} within {:?}", self.device, FRAME_TIMEOUT),
            }
            .into()),
        }
    }

    async fn release(&mut self) {
        self.shutdown_pipeline();
        debug!("Released camera {}", self.device);
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

impl Drop for DeviceCamera {
    fn drop(&mut self) {
        self.shutdown_pipeline();
    }
}

/// Opens the configured V4L2 device
pub struct DeviceOpener {
    config: CameraConfig,
}

impl DeviceOpener {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CameraOpener for DeviceOpener {
    async fn open(&self) -> std::result::Result<Box<dyn FrameSource>, CameraError> {
        let config = self.config.clone();
        let camera = tokio::task::spawn_blocking(move || DeviceCamera::open(&config))
            .await
            .map_err(|e| CameraError::Unavailable {
                device: self.device_name(),
                details: format!("Open task failed: {}", e),
            })??;
        Ok(Box::new(camera))
    }

    fn device_name(&self) -> String {
        format!("/dev/video{}", self.config.index)
    }
}

fn build_pipeline_string(config: &CameraConfig) -> String {
    let (width, height) = config.resolution;
    format!(
        "v4l2src device=/dev/video{} ! \
         videoconvert ! videoscale ! \
         video/x-raw,format=RGB,width={},height={} ! \
         appsink name=sink sync=false max-buffers=2 drop=true emit-signals=false",
        config.index, width, height
    )
}

/// Copy a sample into a tightly packed RGB frame, dropping row padding
fn sample_to_frame(sample: &gstreamer::Sample, frame_id: u64) -> Result<FrameData> {
    let buffer = sample.buffer().ok_or_else(|| CameraError::Stream {
        details: "No buffer in sample".to_string(),
    })?;

    let caps = sample.caps().ok_or_else(|| CameraError::Stream {
        details: "No caps in sample".to_string(),
    })?;

    let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::Stream {
        details: format!("Failed to get video info: {}", e),
    })?;

    let width = video_info.width();
    let height = video_info.height();
    let stride = video_info.stride()[0] as usize;
    let row_bytes = width as usize * 3;

    let map = buffer.map_readable().map_err(|e| CameraError::Stream {
        details: format!("Failed to map buffer: {}", e),
    })?;
    let slice = map.as_slice();

    if width == 0
        || height == 0
        || stride < row_bytes
        || slice.len() < stride * (height as usize - 1) + row_bytes
    {
        return Err(CameraError::Stream {
            details: format!(
                "Buffer of {} bytes too small for {}x{} with stride {}",
                slice.len(),
                width,
                height,
                stride
            ),
        }
        .into());
    }

    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        data.extend_from_slice(&slice[start..start + row_bytes]);
    }

    trace!("Captured frame {} ({}x{})", frame_id, width, height);

    Ok(FrameData::new(
        frame_id,
        SystemTime::now(),
        data,
        width,
        height,
    ))
}
