//! Image I/O operations service
//!
//! Keeps byte-level decoding and file access out of the pipeline stages so
//! they only ever see [`RasterBuffer`] values.

use crate::{
    error::{Result, StudioError},
    types::RasterBuffer,
};
use image::{codecs::png::PngEncoder, DynamicImage, ImageDecoder, ImageEncoder, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Service for decoding uploads and reading or writing files
pub struct ImageIOService;

impl ImageIOService {
    /// Decode encoded image bytes, applying any EXIF orientation
    ///
    /// # Examples
    /// ```rust,no_run
    /// use imgly_studio::services::ImageIOService;
    ///
    /// let bytes = std::fs::read("product.jpg")?;
    /// let raster = ImageIOService::decode(&bytes)?;
    /// println!("{}x{}", raster.width(), raster.height());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - Empty input
    /// - Unrecognized or unsupported format
    /// - Corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<RasterBuffer> {
        if bytes.is_empty() {
            return Err(StudioError::decode("Input is empty"));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| StudioError::decode(format!("Cannot read input: {}", e)))?;
        let format = reader.format().ok_or_else(|| {
            StudioError::decode(format!(
                "Unrecognized image format ({} bytes)",
                bytes.len()
            ))
        })?;

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| StudioError::decode(format!("Unsupported {:?} input: {}", format, e)))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| StudioError::decode(format!("Invalid {:?} metadata: {}", format, e)))?;
        let mut image = DynamicImage::from_decoder(decoder)
            .map_err(|e| StudioError::decode(format!("Corrupt {:?} data: {}", format, e)))?;
        image.apply_orientation(orientation);

        if image.width() == 0 || image.height() == 0 {
            return Err(StudioError::decode("Image has zero width or height"));
        }

        log::debug!(
            "Decoded {:?} input: {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );
        Ok(RasterBuffer::from_dynamic(image))
    }

    /// Read and decode an image file
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Contents fail [`ImageIOService::decode`]
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RasterBuffer> {
        let path_ref = path.as_ref();
        let bytes = std::fs::read(path_ref)
            .map_err(|e| StudioError::file_io_error("read image file", path_ref, &e))?;
        Self::decode(&bytes)
    }

    /// Write encoded bytes, creating parent directories as needed
    ///
    /// # Errors
    /// - Directory creation or file write failure
    pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StudioError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }
        std::fs::write(path_ref, bytes)
            .map_err(|e| StudioError::file_io_error("write output file", path_ref, &e))
    }

    /// Quick in-memory PNG for handing rasters to network services
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn to_png_bytes(raster: &RasterBuffer) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                raster.as_bytes(),
                raster.width(),
                raster.height(),
                raster.as_dynamic().color().into(),
            )
            .map_err(|e| StudioError::encode(format!("PNG serialization failed: {}", e)))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            ImageIOService::decode(&[]),
            Err(StudioError::Decode(_))
        ));
        assert!(matches!(
            ImageIOService::decode(b"definitely not an image"),
            Err(StudioError::Decode(_))
        ));
    }

    #[test]
    fn test_png_round_trip_keeps_alpha() {
        let mut rgba = RgbaImage::new(6, 4);
        rgba.put_pixel(2, 1, Rgba([1, 2, 3, 128]));
        let raster = RasterBuffer::from_rgba(rgba);

        let bytes = ImageIOService::to_png_bytes(&raster).unwrap();
        let decoded = ImageIOService::decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (6, 4));
        assert!(decoded.has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(2, 1), &Rgba([1, 2, 3, 128]));
    }

    #[test]
    fn test_truncated_png_is_decode_error() {
        let raster = RasterBuffer::from_rgba(RgbaImage::new(32, 32));
        let bytes = ImageIOService::to_png_bytes(&raster).unwrap();
        let truncated = bytes.get(..bytes.len() / 2).unwrap();
        assert!(matches!(
            ImageIOService::decode(truncated),
            Err(StudioError::Decode(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.png");
        let bytes =
            ImageIOService::to_png_bytes(&RasterBuffer::from_rgba(RgbaImage::new(3, 3))).unwrap();

        ImageIOService::write_bytes(&path, &bytes).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (3, 3));

        let missing = ImageIOService::load_image(dir.path().join("missing.png"));
        assert!(matches!(missing, Err(StudioError::Io(_))));
    }
}
