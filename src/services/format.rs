//! Output format handling service
//!
//! Channel conversions and per-format facts (extension, MIME type, alpha and
//! DPI support) used by the export encoder.

use crate::config::{Color, OutputFormat};
use image::{Rgb, RgbImage, RgbaImage};

/// Service for per-format conversions and metadata
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Flatten alpha onto an opaque matte color
    ///
    /// # Examples
    /// ```rust
    /// use imgly_studio::{config::Color, services::OutputFormatHandler};
    /// use image::{Rgba, RgbaImage};
    ///
    /// let rgba = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
    /// let rgb = OutputFormatHandler::flatten(&rgba, Color::WHITE);
    /// assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    /// ```
    #[must_use]
    pub fn flatten(rgba_image: &RgbaImage, matte: Color) -> RgbImage {
        let background = [f32::from(matte.r), f32::from(matte.g), f32::from(matte.b)];
        RgbImage::from_fn(rgba_image.width(), rgba_image.height(), |x, y| {
            let pixel = rgba_image.get_pixel(x, y);
            match pixel[3] {
                255 => Rgb([pixel[0], pixel[1], pixel[2]]),
                0 => matte.to_rgb(),
                alpha => {
                    let a = f32::from(alpha) / 255.0;
                    let mix = |c: u8, bg: f32| (f32::from(c) * a + bg * (1.0 - a)).round() as u8;
                    Rgb([
                        mix(pixel[0], background[0]),
                        mix(pixel[1], background[1]),
                        mix(pixel[2], background[2]),
                    ])
                },
            }
        })
    }

    /// Zero the color of fully transparent pixels
    ///
    /// Keeps whatever was under the foreground from leaking through color
    /// channels of an otherwise invisible pixel.
    pub fn clear_transparent(rgba_image: &mut RgbaImage) {
        for pixel in rgba_image.pixels_mut() {
            if pixel[3] == 0 {
                pixel.0 = [0, 0, 0, 0];
            }
        }
    }

    /// File extension without the dot
    ///
    /// # Examples
    /// ```rust
    /// use imgly_studio::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
        }
    }

    #[must_use]
    pub fn mime_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Whether the format carries an alpha channel
    ///
    /// # Examples
    /// ```rust
    /// use imgly_studio::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
    /// assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
    /// ```
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Whether the encoder writes pixel density metadata
    #[must_use]
    pub fn supports_dpi(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::Jpeg => true,
            OutputFormat::WebP => false,
        }
    }

    /// Valid quality range, `None` for lossless formats
    #[must_use]
    pub fn get_quality_range(format: OutputFormat) -> Option<(u8, u8)> {
        match format {
            OutputFormat::Jpeg | OutputFormat::WebP => Some((1, 100)),
            OutputFormat::Png => None,
        }
    }

    /// Warn about settings the chosen format will ignore
    pub fn warn_ignored_settings(format: OutputFormat, transparent: bool) {
        if !Self::supports_dpi(format) {
            log::warn!(
                "{:?} output carries no DPI metadata; print workflows should use PNG or JPEG",
                format
            );
        }
        if transparent && format == OutputFormat::WebP {
            log::debug!("WebP transparency is lossy; edges may show compression artifacts");
        }
    }
}
