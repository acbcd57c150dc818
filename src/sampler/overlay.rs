use crate::config::SamplerConfig;
use crate::emotion::EmotionVector;
#[cfg(feature = "captions")]
use crate::error::{MoodcamError, Result};
use crate::frame::{BoundingBox, FrameData};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, warn};

const BOX_COLOR: Rgb<u8> = Rgb([0, 220, 80]);
const BOX_THICKNESS: u32 = 2;

/// Draws the face box and the dominant emotion onto live frames
pub struct Annotator {
    draw_box: bool,
    #[cfg(feature = "captions")]
    caption: Option<Caption>,
}

#[cfg(feature = "captions")]
struct Caption {
    font: rusttype::Font<'static>,
    size: f32,
}

impl Annotator {
    /// Frames pass through untouched
    pub fn disabled() -> Self {
        Self {
            draw_box: false,
            #[cfg(feature = "captions")]
            caption: None,
        }
    }

    /// Build from sampler settings. A font that cannot be loaded only
    /// disables the caption.
    pub fn from_config(config: &SamplerConfig) -> Self {
        if !config.annotate {
            return Self::disabled();
        }

        #[cfg(feature = "captions")]
        {
            let caption = config.font_path.as_deref().and_then(|path| {
                match load_font(path) {
                    Ok(font) => Some(Caption {
                        font,
                        size: config.font_size,
                    }),
                    Err(e) => {
                        warn!("Emotion captions disabled: {}", e);
                        None
                    }
                }
            });
            Self {
                draw_box: true,
                caption,
            }
        }

        #[cfg(not(feature = "captions"))]
        {
            if config.font_path.is_some() {
                warn!("Built without caption support; font_path ignored");
            }
            Self { draw_box: true }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.draw_box
    }

    /// Copy of `frame` with the detection drawn in. Returns the frame
    /// itself when there is nothing to draw.
    pub fn annotate(
        &self,
        frame: &FrameData,
        detection: Option<BoundingBox>,
        emotions: Option<&EmotionVector>,
    ) -> FrameData {
        let region = match detection {
            Some(region) if self.draw_box => region,
            _ => return frame.clone(),
        };

        let mut image = match frame.to_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                debug!("Not annotating frame {}: {}", frame.id, e);
                return frame.clone();
            }
        };

        for inset in 0..BOX_THICKNESS {
            let width = region.width.saturating_sub(inset * 2);
            let height = region.height.saturating_sub(inset * 2);
            if width == 0 || height == 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut image,
                Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
                    .of_size(width, height),
                BOX_COLOR,
            );
        }

        self.draw_caption(&mut image, region, emotions);

        FrameData::from_image(frame.id, frame.timestamp, image)
    }
}

impl Annotator {
    #[cfg(feature = "captions")]
    fn draw_caption(
        &self,
        image: &mut image::RgbImage,
        region: BoundingBox,
        emotions: Option<&EmotionVector>,
    ) {
        if let (Some(caption), Some(emotions)) = (&self.caption, emotions) {
            caption.draw(image, region, emotions);
        }
    }

    #[cfg(not(feature = "captions"))]
    fn draw_caption(
        &self,
        _image: &mut image::RgbImage,
        _region: BoundingBox,
        _emotions: Option<&EmotionVector>,
    ) {
    }
}

#[cfg(feature = "captions")]
impl Caption {
    fn draw(&self, image: &mut image::RgbImage, region: BoundingBox, emotions: &EmotionVector) {
        use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
        use rusttype::Scale;

        let (emotion, confidence) = emotions.dominant();
        let text = format!("{}: {:.2}", emotion, confidence);
        let scale = Scale::uniform(self.size);
        let (text_width, text_height) = text_size(scale, &self.font, &text);

        let padding = 4;
        let label_height = text_height + padding * 2;
        // Above the box when there is room, otherwise inside its top edge
        let y = if region.y as i32 >= label_height {
            region.y as i32 - label_height
        } else {
            region.y as i32
        };
        let x = region.x as i32;

        draw_filled_rect_mut(
            image,
            Rect::at(x, y).of_size(
                (text_width + padding * 2).max(1) as u32,
                label_height.max(1) as u32,
            ),
            Rgb([20, 20, 20]),
        );
        draw_text_mut(
            image,
            Rgb([255, 255, 255]),
            x + padding,
            y + padding,
            scale,
            &self.font,
            &text,
        );
    }
}

#[cfg(feature = "captions")]
fn load_font(path: &str) -> Result<rusttype::Font<'static>> {
    let data = std::fs::read(path).map_err(|e| {
        MoodcamError::component("overlay", &format!("Failed to read font file '{}': {}", path, e))
    })?;
    rusttype::Font::try_from_vec(data).ok_or_else(|| {
        MoodcamError::component("overlay", &format!("Failed to parse font file '{}'", path))
    })
}
