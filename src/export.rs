//! Export encoding
//!
//! Rescales a finished image to the requested longest edge and serializes it
//! as PNG, JPEG or WebP with pixel density metadata where the format has a
//! place for it.

use crate::{
    config::{ExportSpec, OutputFormat},
    error::{Result, StudioError},
    resample::resize_raster,
    services::OutputFormatHandler,
    types::{CompositeResult, RasterBuffer},
};
use image::{
    codecs::{
        jpeg::{JpegEncoder, PixelDensity},
        png::{CompressionType, FilterType as PngFilter, PngEncoder},
    },
    DynamicImage, ExtendedColorType, ImageEncoder,
};
use serde::Serialize;
use tracing::instrument;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const INCHES_PER_METER: f64 = 39.370_078_740_157_48;

/// Encoded, self-contained image plus the facts a caller needs to store it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedImage {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl ExportedImage {
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        OutputFormatHandler::mime_type(self.format)
    }

    #[must_use]
    pub fn extension(&self) -> &'static str {
        OutputFormatHandler::get_extension(self.format)
    }

    /// Deterministic file name: `<stem>_<w>x<h>@<dpi>dpi.<ext>`
    ///
    /// ```rust
    /// use imgly_studio::{config::OutputFormat, export::ExportedImage};
    ///
    /// let image = ExportedImage { bytes: vec![], format: OutputFormat::Jpeg, width: 819, height: 1024, dpi: 300 };
    /// assert_eq!(image.file_name("mug"), "mug_819x1024@300dpi.jpg");
    /// ```
    #[must_use]
    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{}_{}x{}@{}dpi.{}",
            stem,
            self.width,
            self.height,
            self.dpi,
            self.extension()
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Serializes rasters according to an [`ExportSpec`]
pub struct ExportEncoder;

impl ExportEncoder {
    /// Encode `image`
    ///
    /// With the transparent override the image's own alpha channel is the
    /// foreground footprint; use [`ExportEncoder::export_composite`] to drop
    /// a composed background instead.
    ///
    /// # Errors
    /// - Spec fails [`ExportSpec::validate`] (checked before any pixel work)
    /// - Transparent override on an image without alpha
    /// - Codec failure
    #[instrument(level = "debug", skip_all, fields(format = ?spec.format, edge = spec.target_edge))]
    pub fn export(image: &RasterBuffer, spec: &ExportSpec) -> Result<ExportedImage> {
        spec.validate()?;
        if spec.transparent && !image.has_alpha() {
            return Err(StudioError::encode(
                "Transparent background requested for an image without an alpha channel",
            ));
        }
        Self::encode(image, spec)
    }

    /// Encode a composite, using only its foreground layer when the
    /// transparent override is set
    ///
    /// # Errors
    /// - Same as [`ExportEncoder::export`]
    pub fn export_composite(composite: &CompositeResult, spec: &ExportSpec) -> Result<ExportedImage> {
        spec.validate()?;
        let source = if spec.transparent {
            &composite.foreground
        } else {
            &composite.image
        };
        Self::export(source, spec)
    }

    /// Output dimensions for a longest edge of `target_edge`
    #[must_use]
    pub fn scaled_dimensions(width: u32, height: u32, target_edge: u32) -> (u32, u32) {
        if width >= height {
            let h = (f64::from(height) * f64::from(target_edge) / f64::from(width)).round() as u32;
            (target_edge, h.max(1))
        } else {
            let w = (f64::from(width) * f64::from(target_edge) / f64::from(height)).round() as u32;
            (w.max(1), target_edge)
        }
    }

    fn encode(image: &RasterBuffer, spec: &ExportSpec) -> Result<ExportedImage> {
        OutputFormatHandler::warn_ignored_settings(spec.format, spec.transparent);

        let (width, height) = Self::scaled_dimensions(image.width(), image.height(), spec.target_edge);
        let resized: DynamicImage = if (width, height) == image.dimensions() {
            image.as_dynamic().clone()
        } else {
            log::debug!(
                "Rescaling {}x{} to {}x{} for export",
                image.width(),
                image.height(),
                width,
                height
            );
            resize_raster(image, width, height).into_dynamic()
        };

        let bytes = match spec.format {
            OutputFormat::Png => Self::encode_png(resized, spec)?,
            OutputFormat::Jpeg => Self::encode_jpeg(&resized, spec)?,
            OutputFormat::WebP => Self::encode_webp(&resized, spec)?,
        };

        log::info!(
            "Exported {}x{} {:?} ({} bytes, {} dpi)",
            width,
            height,
            spec.format,
            bytes.len(),
            spec.dpi
        );
        Ok(ExportedImage {
            bytes,
            format: spec.format,
            width,
            height,
            dpi: spec.dpi,
        })
    }

    fn png_compression(level: u8) -> CompressionType {
        match level {
            0..=3 => CompressionType::Fast,
            4..=6 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }

    fn encode_png(image: DynamicImage, spec: &ExportSpec) -> Result<Vec<u8>> {
        let image = if spec.transparent {
            let mut rgba = image.into_rgba8();
            OutputFormatHandler::clear_transparent(&mut rgba);
            DynamicImage::ImageRgba8(rgba)
        } else {
            image
        };

        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            &mut buffer,
            Self::png_compression(spec.compression),
            PngFilter::Adaptive,
        );
        encoder
            .write_image(
                image.as_bytes(),
                image.width(),
                image.height(),
                ExtendedColorType::from(image.color()),
            )
            .map_err(|e| StudioError::encode(format!("PNG encoding failed: {}", e)))?;

        insert_png_chunk(&buffer, b"pHYs", &phys_payload(spec.dpi))
    }

    fn encode_jpeg(image: &DynamicImage, spec: &ExportSpec) -> Result<Vec<u8>> {
        let rgb = if image.color().has_alpha() {
            OutputFormatHandler::flatten(&image.to_rgba8(), spec.matte)
        } else {
            image.to_rgb8()
        };

        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, spec.quality);
        let dpi = u16::try_from(spec.dpi).map_err(|_| {
            StudioError::export_value_error("dpi", spec.dpi, "1-2400")
        })?;
        encoder.set_pixel_density(PixelDensity::dpi(dpi));
        encoder
            .encode_image(&rgb)
            .map_err(|e| StudioError::encode(format!("JPEG encoding failed: {}", e)))?;
        Ok(buffer)
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(image: &DynamicImage, spec: &ExportSpec) -> Result<Vec<u8>> {
        let mut rgba = image.to_rgba8();
        if spec.transparent {
            OutputFormatHandler::clear_transparent(&mut rgba);
        }
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
        let memory = encoder
            .encode_simple(false, f32::from(spec.quality))
            .map_err(|e| StudioError::encode(format!("WebP encoding failed: {:?}", e)))?;
        Ok(memory.to_vec())
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(_image: &DynamicImage, _spec: &ExportSpec) -> Result<Vec<u8>> {
        Err(StudioError::encode(
            "WebP output requires the 'webp-support' feature",
        ))
    }
}

/// pHYs payload: pixels per meter on both axes, unit = meter
fn phys_payload(dpi: u32) -> [u8; 9] {
    let ppm = (f64::from(dpi) * INCHES_PER_METER).round() as u32;
    let mut payload = [0u8; 9];
    for (slot, byte) in payload
        .iter_mut()
        .zip(ppm.to_be_bytes().into_iter().chain(ppm.to_be_bytes()).chain([1u8]))
    {
        *slot = byte;
    }
    payload
}

/// Build a complete PNG chunk: length, type, data, CRC over type and data
fn png_chunk(chunk_type: &[u8; 4], data: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(data.len())
        .map_err(|_| StudioError::encode("PNG chunk too large"))?;
    let mut chunk = Vec::with_capacity(data.len() + 12);
    chunk.extend_from_slice(&length.to_be_bytes());
    chunk.extend_from_slice(chunk_type);
    chunk.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    chunk.extend_from_slice(&hasher.finalize().to_be_bytes());
    Ok(chunk)
}

/// Insert a chunk before the first IDAT, replacing any existing chunk of the same type
fn insert_png_chunk(png_data: &[u8], chunk_type: &[u8; 4], data: &[u8]) -> Result<Vec<u8>> {
    if png_data.get(0..8) != Some(PNG_SIGNATURE.as_slice()) {
        return Err(StudioError::encode("Invalid PNG signature"));
    }

    let new_chunk = png_chunk(chunk_type, data)?;
    let mut result = Vec::with_capacity(png_data.len() + new_chunk.len());
    result.extend_from_slice(PNG_SIGNATURE);
    let mut pos = 8;
    let mut inserted = false;

    while pos < png_data.len() {
        let length_bytes: [u8; 4] = png_data
            .get(pos..pos + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| StudioError::encode("Truncated PNG: incomplete chunk length"))?;
        let length = u32::from_be_bytes(length_bytes) as usize;
        let current_type = png_data
            .get(pos + 4..pos + 8)
            .ok_or_else(|| StudioError::encode("Truncated PNG: incomplete chunk type"))?;
        let end = pos + 12 + length;
        let chunk = png_data
            .get(pos..end)
            .ok_or_else(|| StudioError::encode("Truncated PNG: incomplete chunk data"))?;

        if current_type == b"IDAT" && !inserted {
            result.extend_from_slice(&new_chunk);
            inserted = true;
        }
        if current_type != chunk_type.as_slice() {
            result.extend_from_slice(chunk);
        }
        pos = end;
    }

    if !inserted {
        return Err(StudioError::encode("PNG has no IDAT chunk"));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checker(width: u32, height: u32) -> RasterBuffer {
        RasterBuffer::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgba([240, 240, 240, 255])
            } else {
                Rgba([30, 30, 30, 255])
            }
        }))
    }

    /// Find a chunk's payload in a PNG stream
    fn find_chunk<'a>(png: &'a [u8], chunk_type: &[u8; 4]) -> Option<&'a [u8]> {
        let mut pos = 8;
        while pos + 8 <= png.len() {
            let length = u32::from_be_bytes(png.get(pos..pos + 4)?.try_into().ok()?) as usize;
            if png.get(pos + 4..pos + 8)? == chunk_type {
                return png.get(pos + 8..pos + 8 + length);
            }
            pos += 12 + length;
        }
        None
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(ExportEncoder::scaled_dimensions(1024, 1024, 2048), (2048, 2048));
        assert_eq!(ExportEncoder::scaled_dimensions(819, 1024, 512), (410, 512));
        assert_eq!(ExportEncoder::scaled_dimensions(1600, 900, 1000), (1000, 563));
        assert_eq!(ExportEncoder::scaled_dimensions(5000, 2, 100), (100, 1));
    }

    #[test]
    fn test_png_phys_chunk() {
        let spec = ExportSpec::builder().target_edge(64).dpi(300).build().unwrap();
        let exported = ExportEncoder::export(&checker(64, 64), &spec).unwrap();

        let payload = find_chunk(&exported.bytes, b"pHYs").unwrap();
        assert_eq!(payload.len(), 9);
        let ppm = u32::from_be_bytes(payload.get(0..4).unwrap().try_into().unwrap());
        assert_eq!(ppm, 11811);
        assert_eq!(payload.get(8), Some(&1));

        let decoded = image::load_from_memory(&exported.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_jpeg_density_and_flatten() {
        let spec = ExportSpec::builder()
            .format(OutputFormat::Jpeg)
            .target_edge(32)
            .dpi(600)
            .quality(95)
            .build()
            .unwrap();
        let transparent = RasterBuffer::from_rgba(RgbaImage::new(64, 32));
        let exported = ExportEncoder::export(&transparent, &spec).unwrap();

        assert_eq!(exported.bytes.get(0..2), Some([0xFF, 0xD8].as_slice()));
        assert_eq!(exported.bytes.get(6..11), Some(b"JFIF\0".as_slice()));
        assert_eq!(exported.bytes.get(13), Some(&1));
        assert_eq!(exported.bytes.get(14..16), Some(600u16.to_be_bytes().as_slice()));

        let decoded = image::load_from_memory(&exported.bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 16));
        assert!(decoded.pixels().all(|p| p.0.iter().all(|&c| c > 245)));
    }

    #[test]
    fn test_transparent_export_needs_alpha() {
        let rgb = RasterBuffer::from_rgb(image::RgbImage::new(8, 8));
        let spec = ExportSpec::builder().transparent(true).target_edge(8).build().unwrap();
        assert!(matches!(
            ExportEncoder::export(&rgb, &spec),
            Err(StudioError::Encode(_))
        ));
    }

    #[test]
    fn test_invalid_spec_rejected_before_encoding() {
        let spec = ExportSpec {
            format: OutputFormat::Jpeg,
            transparent: true,
            ..ExportSpec::default()
        };
        assert!(matches!(
            ExportEncoder::export(&checker(16, 16), &spec),
            Err(StudioError::Encode(_))
        ));
    }

    #[test]
    fn test_insert_chunk_replaces_existing() {
        let spec = ExportSpec::builder().target_edge(16).dpi(72).build().unwrap();
        let first = ExportEncoder::export(&checker(16, 16), &spec).unwrap();
        let again = insert_png_chunk(&first.bytes, b"pHYs", &phys_payload(150)).unwrap();

        let count = again.windows(4).filter(|w| *w == b"pHYs").count();
        assert_eq!(count, 1);
        let payload = find_chunk(&again, b"pHYs").unwrap();
        let ppm = u32::from_be_bytes(payload.get(0..4).unwrap().try_into().unwrap());
        assert_eq!(ppm, 5906);
        assert!(image::load_from_memory(&again).is_ok());
    }

    #[test]
    fn test_insert_chunk_rejects_non_png() {
        assert!(insert_png_chunk(b"GIF89a....", b"pHYs", &[0; 9]).is_err());
    }

    #[test]
    fn test_file_name_and_mime() {
        let spec = ExportSpec::builder().target_edge(20).dpi(300).build().unwrap();
        let exported = ExportEncoder::export(&checker(40, 20), &spec).unwrap();
        assert_eq!(exported.file_name("vase"), "vase_20x10@300dpi.png");
        assert_eq!(exported.mime_type(), "image/png");
    }
}
