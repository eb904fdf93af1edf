//! Backdrop rendering for locally composed scenes

use crate::{
    config::{BackgroundKind, Color, GradientStops},
    error::{Result, StudioError},
    types::RasterBuffer,
};
use image::{imageops::FilterType, RgbaImage};

/// Renders a [`BackgroundKind`] onto a square canvas
pub struct BackgroundBuilder;

impl BackgroundBuilder {
    /// Render the backdrop at `size` x `size`
    ///
    /// # Errors
    /// - Zero size
    /// - [`BackgroundKind::Generated`], which only the scene generator produces
    pub fn build(kind: &BackgroundKind, size: u32) -> Result<RgbaImage> {
        if size == 0 {
            return Err(StudioError::config_value_error(
                "canvas size",
                size,
                ">= 1",
                None,
            ));
        }

        match kind {
            BackgroundKind::Flat(color) => Ok(Self::flat(*color, size)),
            BackgroundKind::Gradient(stops) => Ok(Self::vertical_gradient(*stops, size)),
            BackgroundKind::External(raster) => Ok(Self::fit_and_crop(raster, size)),
            BackgroundKind::Generated(_) => Err(StudioError::invalid_config(
                "Generated scenes are produced by the scene generator, not the local composer",
            )),
        }
    }

    #[must_use]
    pub fn flat(color: Color, size: u32) -> RgbaImage {
        RgbaImage::from_pixel(size, size, color.to_rgba(255))
    }

    /// `top` on the first row, `bottom` on the last
    #[must_use]
    pub fn vertical_gradient(stops: GradientStops, size: u32) -> RgbaImage {
        let span = size.saturating_sub(1).max(1) as f32;
        let rows: Vec<_> = (0..size)
            .map(|y| stops.top.lerp(stops.bottom, y as f32 / span).to_rgba(255))
            .collect();
        RgbaImage::from_fn(size, size, |_, y| {
            rows.get(y as usize)
                .copied()
                .unwrap_or_else(|| stops.bottom.to_rgba(255))
        })
    }

    /// Scale to cover the canvas, then center-crop the overflow
    #[must_use]
    pub fn fit_and_crop(raster: &RasterBuffer, size: u32) -> RgbaImage {
        if raster.dimensions() == (size, size) {
            return raster.to_rgba8();
        }
        log::debug!(
            "Fitting {}x{} background to {}x{} canvas",
            raster.width(),
            raster.height(),
            size,
            size
        );
        raster
            .as_dynamic()
            .resize_to_fill(size, size, FilterType::Lanczos3)
            .into_rgba8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::GradientPreset, generation::ScenePrompt};
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn test_flat_presets() {
        let beige = BackgroundBuilder::build(&BackgroundKind::Flat(Color::BEIGE), 16).unwrap();
        assert_eq!(beige.dimensions(), (16, 16));
        assert!(beige.pixels().all(|p| *p == Rgba([245, 245, 220, 255])));
    }

    #[test]
    fn test_gradient_endpoints() {
        let stops = GradientPreset::Midnight.stops();
        let image = BackgroundBuilder::build(&BackgroundKind::Gradient(stops), 64).unwrap();
        assert_eq!(*image.get_pixel(10, 0), stops.top.to_rgba(255));
        assert_eq!(*image.get_pixel(10, 63), stops.bottom.to_rgba(255));
        // Rows are uniform
        assert_eq!(image.get_pixel(0, 30), image.get_pixel(63, 30));
    }

    #[test]
    fn test_external_background_fit_and_crop() {
        // Wide image: left half red, right half blue
        let wide = RgbImage::from_fn(400, 100, |x, _| {
            if x < 200 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let kind = BackgroundKind::External(RasterBuffer::from_rgb(wide));
        let image = BackgroundBuilder::build(&kind, 50).unwrap();

        assert_eq!(image.dimensions(), (50, 50));
        // Center-cropped: both halves still present, not squashed
        assert!(image.get_pixel(2, 25)[0] > 200);
        assert!(image.get_pixel(47, 25)[2] > 200);
        assert!(image.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_generated_background_is_rejected() {
        let kind = BackgroundKind::Generated(ScenePrompt::custom("on a beach"));
        assert!(matches!(
            BackgroundBuilder::build(&kind, 32),
            Err(StudioError::InvalidConfig(_))
        ));
    }
}
