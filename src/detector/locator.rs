use super::FaceLocator;
use crate::frame::{BoundingBox, FrameData};
use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    distance_transform::Norm,
    morphology::{dilate, erode},
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Chroma window of skin tones in YCbCr (ITU-R BT.601)
const CB_RANGE: (f32, f32) = (77.0, 127.0);
const CR_RANGE: (f32, f32) = (133.0, 173.0);

/// Locates the largest skin-coloured region as the face.
///
/// Frames are thresholded on chroma, cleaned with a morphological opening
/// and split into connected components; the biggest component at or above
/// `min_face_area` pixels wins.
pub struct SkinRegionLocator {
    min_face_area: u32,
    kernel_size: u8,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    pixels: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Region {
    fn new(x: u32, y: u32) -> Self {
        Self {
            pixels: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.pixels += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
        )
    }
}

impl SkinRegionLocator {
    pub fn new(min_face_area: u32) -> Self {
        Self {
            min_face_area: min_face_area.max(1),
            kernel_size: 1,
        }
    }

    fn skin_mask(image: &RgbImage) -> GrayImage {
        let mut mask = GrayImage::new(image.width(), image.height());
        for (x, y, rgb) in image.enumerate_pixels() {
            let (r, g, b) = (rgb[0] as f32, rgb[1] as f32, rgb[2] as f32);
            let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
            let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
            let skin = (CB_RANGE.0..=CB_RANGE.1).contains(&cb)
                && (CR_RANGE.0..=CR_RANGE.1).contains(&cr);
            if skin {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    fn largest_region(mask: &GrayImage) -> Option<Region> {
        let components = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        let mut regions: HashMap<u32, Region> = HashMap::new();
        for (x, y, label) in components.enumerate_pixels() {
            let label = label[0];
            if label > 0 {
                regions
                    .entry(label)
                    .or_insert_with(|| Region::new(x, y))
                    .include(x, y);
            }
        }

        regions.into_values().max_by(|a, b| {
            a.pixels
                .cmp(&b.pixels)
                .then_with(|| b.min_y.cmp(&a.min_y))
                .then_with(|| b.min_x.cmp(&a.min_x))
        })
    }
}

impl FaceLocator for SkinRegionLocator {
    fn locate(&self, frame: &FrameData) -> Option<BoundingBox> {
        let image = match frame.to_rgb_image() {
            Ok(image) => image,
            Err(e) => {
                debug!("Skipping face search on frame {}: {}", frame.id, e);
                return None;
            }
        };

        let mask = Self::skin_mask(&image);
        let opened = dilate(
            &erode(&mask, Norm::LInf, self.kernel_size),
            Norm::LInf,
            self.kernel_size,
        );

        let region = Self::largest_region(&opened)?;
        trace!(
            "Largest skin region in frame {}: {} px",
            frame.id,
            region.pixels
        );

        if region.pixels < self.min_face_area {
            return None;
        }
        Some(region.bounding_box())
    }
}
