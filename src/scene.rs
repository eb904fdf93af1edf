//! Local scene composition
//!
//! Places a cutout on a square canvas and stacks the layers in a fixed order:
//! background, shadow, reflection, foreground. Each layer is composited with
//! the "over" operator.

use crate::{
    background::BackgroundBuilder,
    config::{ReflectionConfig, SceneSpec, ShadowConfig},
    effects::EffectsSynthesizer,
    error::Result,
    resample::resize_rgba,
    types::{AlphaMask, CompositeResult, Cutout, RasterBuffer},
};
use image::{imageops, RgbaImage};
use tracing::instrument;

/// Composes cutouts into studio scenes
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneComposer {
    effects: EffectsSynthesizer,
}

impl SceneComposer {
    #[must_use]
    pub fn new(shadow: ShadowConfig, reflection: ReflectionConfig) -> Self {
        Self {
            effects: EffectsSynthesizer::new(shadow, reflection),
        }
    }

    #[must_use]
    pub fn with_effects(effects: EffectsSynthesizer) -> Self {
        Self { effects }
    }

    /// Compose `cutout` onto the backdrop described by `spec`
    ///
    /// The output is always `canvas_size` x `canvas_size`. The scale
    /// percentage is clamped to the supported range before use.
    ///
    /// # Errors
    /// - Invalid canvas size
    /// - Background that cannot be built locally (generated scenes)
    #[instrument(level = "debug", skip_all, fields(canvas = spec.canvas_size, scale = spec.scale_percent))]
    pub fn compose(&self, cutout: &Cutout, spec: &SceneSpec) -> Result<CompositeResult> {
        spec.validate()?;
        let background = BackgroundBuilder::build(&spec.background, spec.canvas_size)?;
        self.compose_over(cutout, spec, background)
    }

    /// Compose `cutout` onto an already rendered backdrop
    ///
    /// A backdrop of the wrong size is fit-and-cropped to the canvas.
    ///
    /// # Errors
    /// - Invalid canvas size
    pub fn compose_over(
        &self,
        cutout: &Cutout,
        spec: &SceneSpec,
        background: RgbaImage,
    ) -> Result<CompositeResult> {
        spec.validate()?;
        let size = spec.canvas_size;
        let mut canvas = if background.dimensions() == (size, size) {
            background
        } else {
            BackgroundBuilder::fit_and_crop(&RasterBuffer::from_rgba(background), size)
        };

        let target = Self::target_long_side(size, spec.clamped_scale_percent());
        let foreground = place_subject(cutout, size, target, spec.offset_x, spec.offset_y);
        let placed = Cutout::from_rgba(foreground.clone());

        if spec.shadow {
            let shadow = self.effects.shadow_layer(placed.alpha());
            imageops::overlay(&mut canvas, &shadow, 0, 0);
        }
        if spec.reflection {
            let reflection = self.effects.reflection(&placed).into_rgba8();
            imageops::overlay(&mut canvas, &reflection, 0, 0);
        }
        imageops::overlay(&mut canvas, &foreground, 0, 0);

        log::debug!(
            "Composed {}x{} scene (subject {} px, shadow: {}, reflection: {})",
            size,
            size,
            target,
            spec.shadow,
            spec.reflection
        );
        CompositeResult::new(
            RasterBuffer::from_rgba(canvas),
            RasterBuffer::from_rgba(foreground),
        )
    }

    /// Pixel length of the subject's longer side for a scale percentage
    #[must_use]
    pub fn target_long_side(canvas_size: u32, scale_percent: u32) -> u32 {
        ((f64::from(canvas_size) * f64::from(scale_percent) / 100.0).round() as u32).max(1)
    }
}

/// Crop `cutout` to its visible pixels, scale the longer side to `target`
/// and center it on a transparent `canvas_size` square shifted by the offset
///
/// Pixels pushed past the canvas edge by the offset are clipped. A cutout
/// with no visible pixels yields a fully transparent layer.
#[must_use]
pub fn place_subject(
    cutout: &Cutout,
    canvas_size: u32,
    target: u32,
    offset_x: i32,
    offset_y: i32,
) -> RgbaImage {
    let mut layer = RgbaImage::new(canvas_size, canvas_size);
    let Some(bbox) = cutout.alpha().bounding_box() else {
        return layer;
    };

    let rgba = cutout.to_rgba();
    let mut subject = imageops::crop_imm(&rgba, bbox.x, bbox.y, bbox.width, bbox.height).to_image();

    let longest = bbox.width.max(bbox.height);
    if longest != target {
        let factor = f64::from(target) / f64::from(longest);
        let width = ((f64::from(bbox.width) * factor).round() as u32).max(1);
        let height = ((f64::from(bbox.height) * factor).round() as u32).max(1);
        subject = resize_rgba(&subject, width, height, imageops::FilterType::Lanczos3);
    }

    let x = (i64::from(canvas_size) - i64::from(subject.width())) / 2 + i64::from(offset_x);
    let y = (i64::from(canvas_size) - i64::from(subject.height())) / 2 + i64::from(offset_y);
    imageops::replace(&mut layer, &subject, x, y);
    layer
}

/// Opacity footprint of a placed foreground layer
#[must_use]
pub fn footprint(foreground: &RasterBuffer) -> AlphaMask {
    AlphaMask::from_rgba(&foreground.to_rgba8())
}
