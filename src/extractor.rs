//! Foreground extraction
//!
//! Separates the product from its original background. Segmentation failures
//! never fail the request: the whole frame is kept as foreground instead.

use crate::{
    config::ExtractorConfig,
    error::{Result, StudioError},
    mask::MaskRefiner,
    segmentation::{MattingThresholds, SegmentationBackend},
    types::{AlphaMask, Cutout, RasterBuffer},
};
use image::imageops::FilterType;
use instant::Duration;
use std::sync::Arc;
use tracing::instrument;

/// Outcome of an extraction, for callers that want to surface degradation
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub cutout: Cutout,
    /// Set when segmentation failed and the whole frame was kept
    pub fallback_reason: Option<String>,
}

impl Extraction {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Turns uploads into refined cutouts through a [`SegmentationBackend`]
pub struct ForegroundExtractor {
    backend: Arc<dyn SegmentationBackend>,
    config: ExtractorConfig,
    refiner: MaskRefiner,
}

impl std::fmt::Debug for ForegroundExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundExtractor")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl ForegroundExtractor {
    #[must_use]
    pub fn new(backend: Arc<dyn SegmentationBackend>, config: ExtractorConfig) -> Self {
        let refiner = MaskRefiner::new(config.refinement);
        Self {
            backend,
            config,
            refiner,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Downscaled copy when either side exceeds the safety ceiling
    #[must_use]
    pub fn limit_size(&self, raw: &RasterBuffer) -> Option<RasterBuffer> {
        let max = self.config.max_dimension;
        if raw.width() <= max && raw.height() <= max {
            return None;
        }
        log::info!(
            "Downscaling {}x{} input to fit within {}px",
            raw.width(),
            raw.height(),
            max
        );
        Some(RasterBuffer::from_dynamic(
            raw.as_dynamic().resize(max, max, FilterType::Lanczos3),
        ))
    }

    /// Isolate the subject of `raw`
    ///
    /// Never fails; see [`ForegroundExtractor::extract_detailed`] to learn
    /// whether the fallback was taken.
    pub async fn extract(&self, raw: RasterBuffer) -> Cutout {
        self.extract_detailed(raw).await.cutout
    }

    /// Isolate the subject of `raw`, reporting whether segmentation failed
    ///
    /// A successful cutout is at the working resolution (at most
    /// `max_dimension` per side). The fallback keeps the input untouched at
    /// its original dimensions.
    #[instrument(level = "info", skip_all, fields(backend = self.backend.name(), width = raw.width(), height = raw.height()))]
    pub async fn extract_detailed(&self, raw: RasterBuffer) -> Extraction {
        let scaled = self.limit_size(&raw);
        let working = scaled.as_ref().unwrap_or(&raw);
        let (width, height) = working.dimensions();

        match self.segment(working).await {
            Ok(mask) => {
                let fitted = MaskRefiner::fit_to(mask, width, height);
                let refined = self.refiner.refine(&fitted);
                // Median and erosion can wipe out subjects only a pixel or two wide
                let alpha = if refined.is_empty() && !fitted.is_empty() {
                    log::debug!("Refinement erased the whole subject, keeping the unrefined mask");
                    fitted
                } else {
                    refined
                };
                log::debug!(
                    "Segmentation kept {} of {} pixels",
                    alpha.coverage(),
                    u64::from(width) * u64::from(height)
                );
                let raster = scaled.unwrap_or(raw);
                if alpha.is_empty() && !is_blank(&raster) {
                    return Self::fallback(
                        raster,
                        &StudioError::segmentation("Mask became empty for a non-blank image"),
                    );
                }
                match Cutout::new(raster.clone(), alpha) {
                    Ok(cutout) => Extraction {
                        cutout,
                        fallback_reason: None,
                    },
                    Err(e) => Self::fallback(raster, &e),
                }
            },
            Err(e) => Self::fallback(raw, &e),
        }
    }

    fn fallback(raw: RasterBuffer, error: &StudioError) -> Extraction {
        log::warn!(
            "Segmentation failed, keeping the whole {}x{} frame as foreground: {}",
            raw.width(),
            raw.height(),
            error
        );
        Extraction {
            cutout: Cutout::fully_opaque(raw),
            fallback_reason: Some(error.to_string()),
        }
    }

    async fn segment(&self, raster: &RasterBuffer) -> Result<AlphaMask> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let thresholds = MattingThresholds::from(&self.config);
        let mask = tokio::time::timeout(timeout, self.backend.segment(raster, thresholds))
            .await
            .map_err(|_| {
                StudioError::segmentation(format!(
                    "{} did not answer within {}s",
                    self.backend.name(),
                    self.config.timeout_secs
                ))
            })??;

        if mask.width() == 0 || mask.height() == 0 {
            return Err(StudioError::segmentation("Segmentation returned an empty mask"));
        }
        if mask.is_empty() && !is_blank(raster) {
            return Err(StudioError::segmentation(
                "Segmentation found no foreground in a non-blank image",
            ));
        }
        Ok(mask)
    }
}

/// True when every pixel has the same color (or the image is fully transparent)
fn is_blank(raster: &RasterBuffer) -> bool {
    let rgba = raster.to_rgba8();
    if rgba.pixels().all(|p| p[3] == 0) {
        return true;
    }
    let mut pixels = rgba.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backends::MockBackend, config::MaskRefinementProfile};
    use image::{GrayImage, Luma, Rgba, RgbaImage, RgbImage};

    fn product(width: u32, height: u32) -> RasterBuffer {
        RasterBuffer::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
            if x > width / 4 && x < 3 * width / 4 && y > height / 4 && y < 3 * height / 4 {
                Rgba([90, 60, 30, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }

    #[tokio::test]
    async fn test_extract_with_mock_segmentation() {
        let extractor = ForegroundExtractor::new(Arc::new(MockBackend::new()), ExtractorConfig::default());
        let extraction = extractor.extract_detailed(product(100, 80)).await;

        assert!(!extraction.is_fallback());
        let cutout = extraction.cutout;
        assert_eq!(cutout.dimensions(), (100, 80));
        assert!(cutout.alpha().bounding_box().is_some());
        assert!(cutout.alpha().value(50, 40) >= 250);
        assert_eq!(cutout.alpha().value(2, 2), 0);
    }

    #[tokio::test]
    async fn test_failing_segmentation_falls_back_to_opaque() {
        let extractor = ForegroundExtractor::new(
            Arc::new(MockBackend::failing("model unavailable")),
            ExtractorConfig::default(),
        );
        let raw = RasterBuffer::from_rgb(RgbImage::from_pixel(321, 123, image::Rgb([7, 8, 9])));
        let extraction = extractor.extract_detailed(raw).await;

        assert!(extraction.is_fallback());
        assert_eq!(extraction.cutout.dimensions(), (321, 123));
        assert_eq!(extraction.cutout.alpha().coverage(), 321 * 123);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_segmentation_times_out_to_fallback() {
        let config = ExtractorConfig {
            timeout_secs: 1,
            ..ExtractorConfig::default()
        };
        let extractor =
            ForegroundExtractor::new(Arc::new(MockBackend::delayed(Duration::from_secs(30))), config);
        let extraction = extractor.extract_detailed(product(40, 40)).await;

        assert!(extraction.is_fallback());
        assert!(extraction.fallback_reason.unwrap().contains("within 1s"));
        assert_eq!(extraction.cutout.alpha().coverage(), 1600);
    }

    #[tokio::test]
    async fn test_empty_mask_on_busy_image_falls_back() {
        let backend = MockBackend::with_mask(AlphaMask::filled(40, 40, 0));
        let extractor = ForegroundExtractor::new(Arc::new(backend), ExtractorConfig::default());
        let raw = RasterBuffer::from_rgb(RgbImage::from_fn(40, 40, |x, _| image::Rgb([x as u8, 0, 0])));
        let extraction = extractor.extract_detailed(raw).await;
        assert!(extraction.is_fallback());
    }

    #[tokio::test]
    async fn test_thin_subject_survives_refinement() {
        let mut line = GrayImage::new(64, 64);
        for y in 8..56 {
            line.put_pixel(32, y, Luma([255]));
        }
        let backend = MockBackend::with_mask(AlphaMask::new(line));
        let extractor = ForegroundExtractor::new(Arc::new(backend), ExtractorConfig::default());
        let raw = RasterBuffer::from_rgb(RgbImage::from_fn(64, 64, |x, y| {
            if x == 32 {
                image::Rgb([10, 10, 10])
            } else {
                image::Rgb([250, 250, 250 - (y % 3) as u8])
            }
        }));
        let extraction = extractor.extract_detailed(raw).await;

        assert!(!extraction.is_fallback());
        let bbox = extraction.cutout.alpha().bounding_box().expect("subject kept");
        assert_eq!((bbox.x, bbox.width), (32, 1));
        assert_eq!((bbox.y, bbox.height), (8, 48));
    }

    #[tokio::test]
    async fn test_large_input_is_downscaled() {
        let config = ExtractorConfig {
            max_dimension: 200,
            ..ExtractorConfig::default()
        };
        let extractor = ForegroundExtractor::new(Arc::new(MockBackend::new()), config);
        let cutout = extractor.extract(product(800, 400)).await;
        assert_eq!(cutout.dimensions(), (200, 100));
    }

    #[tokio::test]
    async fn test_mask_at_service_resolution_is_resized() {
        let mut small = GrayImage::new(10, 10);
        for y in 3..7 {
            for x in 3..7 {
                small.put_pixel(x, y, Luma([255]));
            }
        }
        let backend = MockBackend::with_mask(AlphaMask::new(small));
        let config = ExtractorConfig {
            refinement: MaskRefinementProfile::disabled(),
            ..ExtractorConfig::default()
        };
        let extractor = ForegroundExtractor::new(Arc::new(backend), config);
        let raw = RasterBuffer::from_rgb(RgbImage::from_fn(100, 100, |x, y| image::Rgb([x as u8, y as u8, 0])));
        let cutout = extractor.extract(raw).await;

        assert_eq!(cutout.alpha().dimensions(), (100, 100));
        assert!(cutout.alpha().value(50, 50) > 200);
        assert!(cutout.alpha().value(5, 5) < 20);
    }

    #[test]
    fn test_blank_detection() {
        assert!(is_blank(&RasterBuffer::from_rgb(RgbImage::from_pixel(5, 5, image::Rgb([1, 1, 1])))));
        assert!(is_blank(&RasterBuffer::from_rgba(RgbaImage::new(5, 5))));
        assert!(!is_blank(&product(20, 20)));
    }
}
