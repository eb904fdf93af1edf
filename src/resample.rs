//! Alpha-aware resampling
//!
//! Straight-alpha RGBA cannot go through a Lanczos filter directly: fully
//! transparent pixels are stored as black and would bleed into every soft
//! edge. Color is premultiplied in `f32` before filtering and divided back
//! out afterwards.

use crate::types::RasterBuffer;
use image::{imageops, imageops::FilterType, Rgba, Rgba32FImage, RgbaImage};

/// Resize a straight-alpha RGBA image to exactly `width` x `height`
#[must_use]
pub fn resize_rgba(image: &RgbaImage, width: u32, height: u32, filter: FilterType) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }

    let premultiplied = Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = f32::from(a) / 255.0;
        Rgba([
            f32::from(r) / 255.0 * alpha,
            f32::from(g) / 255.0 * alpha,
            f32::from(b) / 255.0 * alpha,
            alpha,
        ])
    });
    let resized = imageops::resize(&premultiplied, width, height, filter);

    RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b, a] = resized.get_pixel(x, y).0;
        // Lanczos lobes can overshoot; color never exceeds its coverage
        let alpha = a.clamp(0.0, 1.0);
        let alpha_u8 = (alpha * 255.0).round() as u8;
        if alpha_u8 == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let straight = |c: f32| ((c.clamp(0.0, alpha) / alpha) * 255.0).round() as u8;
        Rgba([straight(r), straight(g), straight(b), alpha_u8])
    })
}

/// Resize a raster to exactly `width` x `height` with Lanczos3
///
/// Rasters with an alpha channel are filtered premultiplied.
#[must_use]
pub fn resize_raster(raster: &RasterBuffer, width: u32, height: u32) -> RasterBuffer {
    if raster.dimensions() == (width, height) {
        return raster.clone();
    }
    if raster.has_alpha() {
        RasterBuffer::from_rgba(resize_rgba(&raster.to_rgba8(), width, height, FilterType::Lanczos3))
    } else {
        RasterBuffer::from_dynamic(raster.as_dynamic().resize_exact(width, height, FilterType::Lanczos3))
    }
}
