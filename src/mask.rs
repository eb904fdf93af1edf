//! Alpha mask refinement
//!
//! Segmentation services return soft, noisy mattes: speckles in flat
//! backgrounds, a faint halo around the subject and ragged edges. The refiner
//! cleans them up with a fixed sequence of operators from
//! [`MaskRefinementProfile`].

use crate::{config::MaskRefinementProfile, types::AlphaMask};
use image::{imageops, GrayImage};
use imageproc::{
    distance_transform::Norm,
    filter::{gaussian_blur_f32, median_filter},
    morphology::{dilate, erode},
};
use tracing::instrument;

/// Applies a [`MaskRefinementProfile`] to alpha masks
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskRefiner {
    profile: MaskRefinementProfile,
}

impl MaskRefiner {
    #[must_use]
    pub fn new(profile: MaskRefinementProfile) -> Self {
        Self { profile }
    }

    #[must_use]
    pub fn profile(&self) -> &MaskRefinementProfile {
        &self.profile
    }

    /// Run every enabled stage in order: median, threshold, dilate, erode, blur
    ///
    /// Dilation and erosion operate on the binary footprint of the mask, so
    /// with `harden` disabled any soft edge is lost once a morphology stage
    /// runs.
    #[must_use]
    #[instrument(level = "debug", skip_all, fields(width = mask.width(), height = mask.height()))]
    pub fn refine(&self, mask: &AlphaMask) -> AlphaMask {
        let mut gray = mask.as_gray().clone();

        if self.profile.median_radius > 0 {
            gray = median_filter(&gray, self.profile.median_radius, self.profile.median_radius);
        }

        if self.profile.halo_threshold > 0 || self.profile.harden {
            threshold_in_place(&mut gray, self.profile.halo_threshold, self.profile.harden);
        }

        if self.profile.dilate_iterations > 0 {
            gray = dilate(&gray, Norm::LInf, self.profile.dilate_iterations);
        }

        if self.profile.erode_iterations > 0 {
            gray = erode(&gray, Norm::LInf, self.profile.erode_iterations);
        }

        if self.profile.blur_sigma > 0.0 {
            gray = gaussian_blur_f32(&gray, self.profile.blur_sigma);
        }

        AlphaMask::new(gray)
    }

    /// Resize a mask to the given dimensions when it does not already match
    #[must_use]
    pub fn fit_to(mask: AlphaMask, width: u32, height: u32) -> AlphaMask {
        if mask.dimensions() == (width, height) {
            return mask;
        }
        log::debug!(
            "Resizing mask from {}x{} to {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        );
        AlphaMask::new(imageops::resize(
            mask.as_gray(),
            width,
            height,
            imageops::FilterType::Lanczos3,
        ))
    }
}

/// Values below `threshold` become 0; with `harden` the rest become 255
fn threshold_in_place(gray: &mut GrayImage, threshold: u8, harden: bool) {
    for pixel in gray.pixels_mut() {
        if pixel[0] < threshold {
            pixel[0] = 0;
        } else if harden {
            pixel[0] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square_mask(size: u32, start: u32, end: u32) -> AlphaMask {
        AlphaMask::new(GrayImage::from_fn(size, size, |x, y| {
            if (start..end).contains(&x) && (start..end).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }

    #[test]
    fn test_disabled_profile_is_identity() {
        let mask = square_mask(32, 8, 24);
        let refined = MaskRefiner::new(MaskRefinementProfile::disabled()).refine(&mask);
        assert_eq!(refined, mask);
    }

    #[test]
    fn test_median_removes_isolated_speckles() {
        let mut gray = square_mask(32, 8, 24).into_gray();
        gray.put_pixel(2, 2, Luma([255]));
        gray.put_pixel(29, 4, Luma([200]));

        let profile = MaskRefinementProfile {
            median_radius: 1,
            ..MaskRefinementProfile::disabled()
        };
        let refined = MaskRefiner::new(profile).refine(&AlphaMask::new(gray));
        assert_eq!(refined.value(2, 2), 0);
        assert_eq!(refined.value(29, 4), 0);
        assert_eq!(refined.value(16, 16), 255);
    }

    #[test]
    fn test_halo_threshold_and_harden() {
        let gray = GrayImage::from_fn(4, 1, |x, _| Luma([[3u8, 9, 10, 128][x as usize]]));
        let profile = MaskRefinementProfile {
            halo_threshold: 10,
            harden: true,
            ..MaskRefinementProfile::disabled()
        };
        let refined = MaskRefiner::new(profile).refine(&AlphaMask::new(gray.clone()));
        assert_eq!(refined.as_gray().as_raw(), &vec![0, 0, 255, 255]);

        let soft = MaskRefinementProfile {
            halo_threshold: 10,
            harden: false,
            ..MaskRefinementProfile::disabled()
        };
        let refined = MaskRefiner::new(soft).refine(&AlphaMask::new(gray));
        assert_eq!(refined.as_gray().as_raw(), &vec![0, 0, 10, 128]);
    }

    #[test]
    fn test_dilate_then_erode_restores_square() {
        let mask = square_mask(32, 8, 24);
        let profile = MaskRefinementProfile {
            dilate_iterations: 1,
            erode_iterations: 1,
            ..MaskRefinementProfile::disabled()
        };
        let refined = MaskRefiner::new(profile).refine(&mask);
        assert_eq!(refined, mask);
    }

    #[test]
    fn test_dilation_grows_by_one_pixel() {
        let mask = square_mask(32, 8, 24);
        let profile = MaskRefinementProfile {
            dilate_iterations: 1,
            ..MaskRefinementProfile::disabled()
        };
        let refined = MaskRefiner::new(profile).refine(&mask);
        let bbox = refined.bounding_box().unwrap();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (7, 7, 18, 18));
    }

    #[test]
    fn test_default_profile_softens_edges_only() {
        let mask = square_mask(48, 12, 36);
        let refined = MaskRefiner::default().refine(&mask);

        assert!(refined.value(24, 24) >= 250);
        assert_eq!(refined.value(2, 2), 0);
        let edge = refined.value(12, 24);
        assert!(edge > 0 && edge < 255, "edge pixel should be soft, got {edge}");
    }

    #[test]
    fn test_refinement_is_stable_on_refined_mask() {
        let mask = square_mask(64, 16, 48);
        let refiner = MaskRefiner::default();
        let once = refiner.refine(&mask);
        let twice = refiner.refine(&once);

        let changed = once
            .as_gray()
            .pixels()
            .zip(twice.as_gray().pixels())
            .filter(|(a, b)| a[0].abs_diff(b[0]) > 16)
            .count();
        // Only a thin band around the edge may move
        let perimeter = 4 * 32 + 8;
        assert!(changed <= 4 * perimeter, "{changed} pixels changed");
        assert!(twice.value(32, 32) >= 250);
        assert_eq!(twice.value(1, 1), 0);
    }

    #[test]
    fn test_fit_to_resizes_only_when_needed() {
        let mask = square_mask(16, 4, 12);
        let same = MaskRefiner::fit_to(mask.clone(), 16, 16);
        assert_eq!(same, mask);

        let larger = MaskRefiner::fit_to(mask, 32, 24);
        assert_eq!(larger.dimensions(), (32, 24));
        assert!(larger.value(16, 12) > 200);
    }
}
