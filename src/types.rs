//! Core pixel types shared by every pipeline stage

use crate::error::{Result, StudioError};
use image::{DynamicImage, GrayImage, Luma, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// In-memory 8-bit raster with 3 (RGB) or 4 (RGBA) interleaved channels
///
/// Stages pass buffers by value; nothing in the pipeline keeps a second
/// mutable handle to a buffer it has handed on.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    image: DynamicImage,
}

impl RasterBuffer {
    /// Wrap an RGBA image
    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self {
            image: DynamicImage::ImageRgba8(image),
        }
    }

    /// Wrap an RGB image
    #[must_use]
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    /// Normalize any decoded image to 8-bit RGB or RGBA
    #[must_use]
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Self { image },
            other if other.color().has_alpha() => Self::from_rgba(other.to_rgba8()),
            other => Self::from_rgb(other.to_rgb8()),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Longer of width and height
    #[must_use]
    pub fn longest_edge(&self) -> u32 {
        self.width().max(self.height())
    }

    /// Channel count, 3 or 4
    #[must_use]
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    /// Interleaved pixel bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    #[must_use]
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Copy out as RGBA (RGB buffers become fully opaque)
    #[must_use]
    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    /// Take the pixels as RGBA without copying when already RGBA
    #[must_use]
    pub fn into_rgba8(self) -> RgbaImage {
        self.image.into_rgba8()
    }
}

/// Axis-aligned rectangle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub fn center_x(&self) -> f32 {
        self.x as f32 + self.width as f32 / 2.0
    }
}

/// Single-channel foreground opacity, 0 = transparent, 255 = opaque
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    mask: GrayImage,
}

impl AlphaMask {
    #[must_use]
    pub fn new(mask: GrayImage) -> Self {
        Self { mask }
    }

    /// Uniform mask
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            mask: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    /// Pull the alpha channel out of an RGBA image
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let mask = GrayImage::from_fn(width, height, |x, y| Luma([image.get_pixel(x, y)[3]]));
        Self { mask }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Opacity at a pixel; out-of-range coordinates read as transparent
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.mask.get_pixel_checked(x, y).map_or(0, |p| p[0])
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.mask
    }

    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.mask
    }

    /// Number of pixels with non-zero opacity
    #[must_use]
    pub fn coverage(&self) -> usize {
        self.mask.pixels().filter(|p| p[0] > 0).count()
    }

    /// True when every pixel is fully transparent
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mask.pixels().all(|p| p[0] == 0)
    }

    /// Tight box around all pixels with opacity above zero
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box_above(0)
    }

    /// Tight box around all pixels with opacity strictly above `threshold`
    #[must_use]
    pub fn bounding_box_above(&self, threshold: u8) -> Option<BoundingBox> {
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut found = false;

        for (x, y, pixel) in self.mask.enumerate_pixels() {
            if pixel[0] > threshold {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        found.then(|| BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }
}

/// Isolated foreground subject: color raster plus its opacity mask
#[derive(Debug, Clone, PartialEq)]
pub struct Cutout {
    raster: RasterBuffer,
    alpha: AlphaMask,
}

impl Cutout {
    /// Pair a raster with its mask
    ///
    /// # Errors
    /// - Mask dimensions differ from the raster dimensions
    pub fn new(raster: RasterBuffer, alpha: AlphaMask) -> Result<Self> {
        if raster.dimensions() != alpha.dimensions() {
            return Err(StudioError::invalid_config(format!(
                "Alpha mask {}x{} does not match raster {}x{}",
                alpha.width(),
                alpha.height(),
                raster.width(),
                raster.height()
            )));
        }
        Ok(Self { raster, alpha })
    }

    /// Build a cutout from an RGBA image, taking its alpha channel as the mask
    #[must_use]
    pub fn from_rgba(image: RgbaImage) -> Self {
        let alpha = AlphaMask::from_rgba(&image);
        Self {
            raster: RasterBuffer::from_rgba(image),
            alpha,
        }
    }

    /// Treat the whole raster as foreground
    #[must_use]
    pub fn fully_opaque(raster: RasterBuffer) -> Self {
        let alpha = AlphaMask::filled(raster.width(), raster.height(), 255);
        Self { raster, alpha }
    }

    #[must_use]
    pub fn raster(&self) -> &RasterBuffer {
        &self.raster
    }

    #[must_use]
    pub fn alpha(&self) -> &AlphaMask {
        &self.alpha
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    #[must_use]
    pub fn into_parts(self) -> (RasterBuffer, AlphaMask) {
        (self.raster, self.alpha)
    }

    /// RGBA rendition with the mask as alpha channel
    ///
    /// Pixels with zero opacity are written as transparent black so no
    /// background color survives in the color channels.
    #[must_use]
    pub fn to_rgba(&self) -> RgbaImage {
        let mut rgba = self.raster.to_rgba8();
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let a = self.alpha.value(x, y);
            if a == 0 {
                pixel.0 = [0, 0, 0, 0];
            } else {
                pixel[3] = a;
            }
        }
        rgba
    }
}

/// Fully layered scene at canvas resolution
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Background, shadow, reflection and foreground flattened together
    pub image: RasterBuffer,
    /// The placed foreground alone on a transparent canvas of the same size
    pub foreground: RasterBuffer,
    pub width: u32,
    pub height: u32,
}

impl CompositeResult {
    /// # Errors
    /// - Foreground layer dimensions differ from the composite
    pub fn new(image: RasterBuffer, foreground: RasterBuffer) -> Result<Self> {
        if image.dimensions() != foreground.dimensions() {
            return Err(StudioError::internal(format!(
                "Foreground layer {}x{} does not match composite {}x{}",
                foreground.width(),
                foreground.height(),
                image.width(),
                image.height()
            )));
        }
        let (width, height) = image.dimensions();
        Ok(Self {
            image,
            foreground,
            width,
            height,
        })
    }
}

/// Per-stage timing breakdown for one render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTimings {
    /// Decoding the uploaded bytes
    pub decode_ms: u64,
    /// Segmentation call plus mask refinement
    pub extraction_ms: u64,
    /// Local composition or external generation
    pub composition_ms: u64,
    /// Aspect-ratio crop
    pub crop_ms: u64,
    /// Rescale and encoding
    pub encode_ms: u64,
    /// Total end-to-end time
    pub total_ms: u64,
}

impl RenderTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent waiting on external capabilities
    #[must_use]
    pub fn external_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            (self.extraction_ms + self.composition_ms) as f64 / self.total_ms as f64
        }
    }
}
