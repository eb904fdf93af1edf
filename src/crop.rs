//! Aspect-ratio cropping
//!
//! Always crops, never stretches or letterboxes: the output is the largest
//! centered rectangle of the requested ratio that fits inside the source.

use crate::{
    error::{Result, StudioError},
    types::{BoundingBox, CompositeResult, RasterBuffer},
};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output aspect ratios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 1:1
    Square,
    /// 4:5, common for social feeds
    Portrait4x5,
    /// 3:4
    Portrait3x4,
    /// 9:16, stories and reels
    Portrait9x16,
    /// 16:9
    Landscape16x9,
    /// 4:3
    Landscape4x3,
}

impl AspectRatio {
    pub const ALL: [Self; 6] = [
        Self::Square,
        Self::Portrait4x5,
        Self::Portrait3x4,
        Self::Portrait9x16,
        Self::Landscape16x9,
        Self::Landscape4x3,
    ];

    /// Width and height terms of the ratio
    #[must_use]
    pub fn components(self) -> (u32, u32) {
        match self {
            Self::Square => (1, 1),
            Self::Portrait4x5 => (4, 5),
            Self::Portrait3x4 => (3, 4),
            Self::Portrait9x16 => (9, 16),
            Self::Landscape16x9 => (16, 9),
            Self::Landscape4x3 => (4, 3),
        }
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        let (w, h) = self.components();
        f64::from(w) / f64::from(h)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.components();
        write!(f, "{}:{}", w, h)
    }
}

impl FromStr for AspectRatio {
    type Err = StudioError;

    /// Parses `"W:H"` (or `"square"`) into one of the supported ratios
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("square") {
            return Ok(Self::Square);
        }
        let parsed = trimmed
            .split_once(':')
            .and_then(|(w, h)| Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?)));
        parsed
            .and_then(|terms| Self::ALL.into_iter().find(|r| r.components() == terms))
            .ok_or_else(|| {
                StudioError::invalid_config(format!(
                    "Unsupported aspect ratio '{}' (expected one of 1:1, 4:5, 3:4, 9:16, 16:9, 4:3)",
                    s
                ))
            })
    }
}

/// Crops images to an [`AspectRatio`]
pub struct CropEngine;

impl CropEngine {
    /// Largest centered rectangle of `ratio` inside `width` x `height`
    #[must_use]
    pub fn crop_rect(width: u32, height: u32, ratio: AspectRatio) -> BoundingBox {
        let (rw, rh) = ratio.components();
        let (w, h) = (u64::from(width), u64::from(height));

        let (crop_w, crop_h) = if w * u64::from(rh) > h * u64::from(rw) {
            // Source is wider than the target: keep full height
            let crop_w = (h as f64 * f64::from(rw) / f64::from(rh)).round() as u32;
            (crop_w.clamp(1, width.max(1)), height)
        } else {
            let crop_h = (w as f64 * f64::from(rh) / f64::from(rw)).round() as u32;
            (width, crop_h.clamp(1, height.max(1)))
        };

        BoundingBox {
            x: (width - crop_w) / 2,
            y: (height - crop_h) / 2,
            width: crop_w,
            height: crop_h,
        }
    }

    /// Crop a raster to `ratio`
    #[must_use]
    pub fn crop_raster(image: &RasterBuffer, ratio: AspectRatio) -> RasterBuffer {
        let rect = Self::crop_rect(image.width(), image.height(), ratio);
        if (rect.width, rect.height) == image.dimensions() {
            return image.clone();
        }
        log::debug!(
            "Cropping {}x{} to {} ({}x{} at {},{})",
            image.width(),
            image.height(),
            ratio,
            rect.width,
            rect.height,
            rect.x,
            rect.y
        );
        let cropped: DynamicImage = image.as_dynamic().crop_imm(rect.x, rect.y, rect.width, rect.height);
        RasterBuffer::from_dynamic(cropped)
    }

    /// Crop a composite's flattened image to `ratio`
    #[must_use]
    pub fn crop(image: &CompositeResult, ratio: AspectRatio) -> RasterBuffer {
        Self::crop_raster(&image.image, ratio)
    }

    /// Crop both the flattened image and the foreground layer
    ///
    /// # Errors
    /// - Composite layers that disagree on dimensions
    pub fn crop_composite(image: CompositeResult, ratio: AspectRatio) -> Result<CompositeResult> {
        let cropped = Self::crop_raster(&image.image, ratio);
        let foreground = Self::crop_raster(&image.foreground, ratio);
        CompositeResult::new(cropped, foreground)
    }
}
