//! Contact shadow and floor reflection synthesis
//!
//! Both effects are pure functions of a mask or cutout plus their
//! configuration, and both return layers in the same frame as their input so
//! the composer can stack them without further placement.

use crate::{
    config::{ReflectionConfig, ShadowConfig},
    types::{AlphaMask, Cutout, RasterBuffer},
};
use image::{imageops, GrayImage, Luma, RgbaImage};
use imageproc::{drawing::draw_filled_ellipse_mut, filter::gaussian_blur_f32};

/// Builds shadow and reflection layers for a subject
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectsSynthesizer {
    shadow: ShadowConfig,
    reflection: ReflectionConfig,
}

impl EffectsSynthesizer {
    #[must_use]
    pub fn new(shadow: ShadowConfig, reflection: ReflectionConfig) -> Self {
        Self { shadow, reflection }
    }

    #[must_use]
    pub fn shadow_config(&self) -> &ShadowConfig {
        &self.shadow
    }

    /// Soft elliptical contact shadow under the subject
    ///
    /// The ellipse is centered horizontally on the subject's bounding box with
    /// its vertical center on the row just below the lowest visible pixel.
    /// An empty mask yields an empty shadow.
    #[must_use]
    pub fn shadow(&self, alpha: &AlphaMask) -> AlphaMask {
        let (width, height) = alpha.dimensions();
        let Some(bbox) = alpha.bounding_box() else {
            return AlphaMask::filled(width, height, 0);
        };

        let ellipse_w = (bbox.width as f32 * self.shadow.width_ratio).round().max(2.0);
        let ellipse_h = (bbox.height as f32 * self.shadow.height_ratio).round().max(2.0);
        let center = (bbox.center_x().floor() as i32, bbox.bottom() as i32);
        let opacity = (self.shadow.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;

        let (radius_x, radius_y) = ((ellipse_w / 2.0) as i32, (ellipse_h / 2.0) as i32);
        let sigma = ellipse_h * self.shadow.blur_factor;

        // Only the ellipse plus the blur's reach is rendered, then pasted into the frame
        let pad = if sigma > 0.0 { (3.0 * sigma).ceil() as i32 + 2 } else { 1 };
        let (half_w, half_h) = (radius_x + pad, radius_y + pad);
        let mut patch = GrayImage::new((2 * half_w + 1) as u32, (2 * half_h + 1) as u32);
        draw_filled_ellipse_mut(&mut patch, (half_w, half_h), radius_x, radius_y, Luma([opacity]));
        if sigma > 0.0 {
            patch = gaussian_blur_f32(&patch, sigma);
        }

        let mut mask = GrayImage::new(width, height);
        imageops::replace(
            &mut mask,
            &patch,
            i64::from(center.0 - half_w),
            i64::from(center.1 - half_h),
        );
        AlphaMask::new(mask)
    }

    /// Shadow mask rendered in the configured shadow color
    #[must_use]
    pub fn shadow_layer(&self, alpha: &AlphaMask) -> RgbaImage {
        let shadow = self.shadow(alpha);
        let color = self.shadow.color;
        RgbaImage::from_fn(shadow.width(), shadow.height(), |x, y| {
            color.to_rgba(shadow.value(x, y))
        })
    }

    /// Mirrored, fading copy of the subject below itself
    ///
    /// The subject's bounding box is flipped vertically, its alpha multiplied
    /// by a linear ramp from `start_opacity` to `end_opacity` across
    /// `fade_fraction` of its height, and anchored `gap` pixels under the
    /// subject. Anything past the frame is clipped.
    #[must_use]
    pub fn reflection(&self, cutout: &Cutout) -> RasterBuffer {
        let (width, height) = cutout.dimensions();
        let mut layer = RgbaImage::new(width, height);
        let Some(bbox) = cutout.alpha().bounding_box() else {
            return RasterBuffer::from_rgba(layer);
        };

        let subject = cutout.to_rgba();
        let subject = imageops::crop_imm(&subject, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
        let mut mirrored = imageops::flip_vertical(&subject);

        let fade_rows = (bbox.height as f32 * self.reflection.fade_fraction).max(1.0);
        let start = self.reflection.start_opacity.clamp(0.0, 1.0);
        let end = self.reflection.end_opacity.clamp(0.0, 1.0);
        for (_, y, pixel) in mirrored.enumerate_pixels_mut() {
            let t = (y as f32 / fade_rows).min(1.0);
            let opacity = start + (end - start) * t;
            pixel[3] = (f32::from(pixel[3]) * opacity).round() as u8;
            if pixel[3] == 0 {
                pixel.0 = [0, 0, 0, 0];
            }
        }

        let top = i64::from(bbox.bottom()) + i64::from(self.reflection.gap);
        imageops::replace(&mut layer, &mirrored, i64::from(bbox.x), top);
        RasterBuffer::from_rgba(layer)
    }
}
