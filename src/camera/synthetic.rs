use super::{CameraOpener, FrameSource};
use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::FrameData;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_ellipse_mut;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, info, trace};

const BACKGROUND: Rgb<u8> = Rgb([40, 60, 90]);
const SKIN: Rgb<u8> = Rgb([224, 172, 140]);
const FEATURE: Rgb<u8> = Rgb([70, 45, 40]);

/// Generated frames showing a face-coloured ellipse drifting side to side
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    frame_limit: Option<u64>,
    next_id: u64,
    last_frame: Option<Instant>,
    released: bool,
}

impl SyntheticCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.resolution.0,
            height: config.resolution.1,
            frame_interval: Duration::from_millis(1000 / config.fps.max(1) as u64),
            frame_limit: config.synthetic_frames,
            next_id: 0,
            last_frame: None,
            released: false,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    async fn next_frame(&mut self) -> Result<Option<FrameData>> {
        if self.released {
            return Err(CameraError::Stream {
                details: "synthetic camera already released".to_string(),
            }
            .into());
        }

        if let Some(limit) = self.frame_limit {
            if self.next_id >= limit {
                debug!("Synthetic camera exhausted after {} frames", limit);
                return Ok(None);
            }
        }

        if let Some(last) = self.last_frame {
            tokio::time::sleep_until(last + self.frame_interval).await;
        }
        self.last_frame = Some(Instant::now());

        let frame_id = self.next_id;
        self.next_id += 1;

        let image = render_synthetic_frame(self.width, self.height, frame_id);
        trace!("Generated synthetic frame {}", frame_id);
        Ok(Some(FrameData::from_image(
            frame_id,
            SystemTime::now(),
            image,
        )))
    }

    async fn release(&mut self) {
        self.released = true;
        debug!("Released synthetic camera after {} frames", self.next_id);
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

/// Draw frame `frame_id` of the synthetic sequence
pub fn render_synthetic_frame(width: u32, height: u32, frame_id: u64) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

    let phase = frame_id as f64 * 0.2;
    let sway = (width as f64 / 6.0) * phase.sin();
    let center_x = (width as f64 / 2.0 + sway) as i32;
    let center_y = (height / 2) as i32;
    let radius_x = (width / 8).max(1) as i32;
    let radius_y = (height / 5).max(1) as i32;

    draw_filled_ellipse_mut(&mut image, (center_x, center_y), radius_x, radius_y, SKIN);

    // Eyes and mouth keep the region from being a perfect blob
    let eye_radius = (radius_x / 6).max(1);
    for offset in [-radius_x / 3, radius_x / 3] {
        draw_filled_ellipse_mut(
            &mut image,
            (center_x + offset, center_y - radius_y / 3),
            eye_radius,
            eye_radius,
            FEATURE,
        );
    }
    draw_filled_ellipse_mut(
        &mut image,
        (center_x, center_y + radius_y / 2),
        (radius_x / 3).max(1),
        (radius_y / 10).max(1),
        FEATURE,
    );

    image
}

/// Hands out a fresh synthetic stream per run
pub struct SyntheticOpener {
    config: CameraConfig,
}

impl SyntheticOpener {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CameraOpener for SyntheticOpener {
    async fn open(&self) -> std::result::Result<Box<dyn FrameSource>, CameraError> {
        if self.config.resolution.0 == 0 || self.config.resolution.1 == 0 {
            return Err(CameraError::Configuration {
                details: "Synthetic camera needs a non-zero resolution".to_string(),
            });
        }
        info!(
            "Opening synthetic camera ({}x{} @ {}fps)",
            self.config.resolution.0, self.config.resolution.1, self.config.fps
        );
        Ok(Box::new(SyntheticCamera::new(&self.config)))
    }

    fn device_name(&self) -> String {
        "synthetic".to_string()
    }
}
