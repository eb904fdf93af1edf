//! Luminance-threshold segmentation for light backdrops
//!
//! A limited local fallback: every pixel brighter than a fixed cutoff is
//! treated as backdrop. It only works for products shot on white or very
//! light seamless paper. Instead of producing a wrong cutout on dark or
//! textured backdrops, the backend refuses them with a segmentation error so
//! the extractor keeps the whole frame.

use crate::{
    error::{Result, StudioError},
    segmentation::{MattingThresholds, SegmentationBackend},
    types::{AlphaMask, RasterBuffer},
};
use async_trait::async_trait;
use image::{GrayImage, Luma, Rgba, RgbaImage};

/// Bright-pixel cutoff segmentation
#[derive(Debug, Clone, Copy)]
pub struct LuminanceBackend {
    cutoff: u8,
    min_border_ratio: f32,
}

impl LuminanceBackend {
    pub const DEFAULT_CUTOFF: u8 = 240;

    #[must_use]
    pub fn new() -> Self {
        Self {
            cutoff: Self::DEFAULT_CUTOFF,
            min_border_ratio: 0.6,
        }
    }

    /// Channel value at or above which a pixel counts as backdrop
    #[must_use]
    pub fn with_cutoff(mut self, cutoff: u8) -> Self {
        self.cutoff = cutoff;
        self
    }

    fn is_backdrop(&self, pixel: &Rgba<u8>) -> bool {
        pixel[3] == 0 || pixel.0.iter().take(3).all(|&c| c >= self.cutoff)
    }

    /// Share of border pixels that look like backdrop
    fn border_ratio(&self, image: &RgbaImage) -> f32 {
        let (width, height) = image.dimensions();
        let mut total = 0u32;
        let mut bright = 0u32;
        for (x, y, pixel) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                total += 1;
                if self.is_backdrop(pixel) {
                    bright += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            bright as f32 / total as f32
        }
    }

    fn mask_for(&self, image: &RgbaImage) -> Result<AlphaMask> {
        let ratio = self.border_ratio(image);
        if ratio < self.min_border_ratio {
            return Err(StudioError::segmentation(format!(
                "Luminance segmentation needs a light backdrop; only {:.0}% of the border is above {}",
                ratio * 100.0,
                self.cutoff
            )));
        }

        let (width, height) = image.dimensions();
        let mask = GrayImage::from_fn(width, height, |x, y| {
            if self.is_backdrop(image.get_pixel(x, y)) {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        Ok(AlphaMask::new(mask))
    }
}

impl Default for LuminanceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentationBackend for LuminanceBackend {
    fn name(&self) -> &str {
        "luminance"
    }

    async fn segment(
        &self,
        image: &RasterBuffer,
        _thresholds: MattingThresholds,
    ) -> Result<AlphaMask> {
        log::debug!(
            "Luminance segmentation on {}x{} (cutoff {})",
            image.width(),
            image.height(),
            self.cutoff
        );
        self.mask_for(&image.to_rgba8())
    }
}
