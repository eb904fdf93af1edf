//! Generative scene synthesis
//!
//! The subject is placed on a square working canvas, a binary preserve mask
//! is derived from its alpha, and both are sent to an external
//! generative-edit capability together with a scene prompt. The capability
//! either answers inline or with a reference that a [`ReferenceResolver`]
//! turns into bytes. Every failure comes back as
//! [`StudioError::Generation`]; no other image is ever substituted.

use crate::{
    config::GeneratorConfig,
    error::{Result, StudioError},
    fetch::ReferenceResolver,
    resample::resize_raster,
    scene::place_subject,
    services::ImageIOService,
    types::{CompositeResult, Cutout, RasterBuffer},
};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use instant::{Duration, Instant};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Appended to every prompt so the capability leaves the product alone
pub const PRESERVATION_INSTRUCTION: &str = "Keep the product in the unmasked area exactly as it is: \
do not change its shape, proportions, colors, materials, texture, labels or printed text. \
Only generate the masked background and the surface the product rests on.";

/// Built-in scene descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenePreset {
    Marble,
    Wood,
    Concrete,
    Silk,
    Studio,
    DarkStudio,
}

impl ScenePreset {
    pub const ALL: [Self; 6] = [
        Self::Marble,
        Self::Wood,
        Self::Concrete,
        Self::Silk,
        Self::Studio,
        Self::DarkStudio,
    ];

    /// Short name used on the command line
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Marble => "marble",
            Self::Wood => "wood",
            Self::Concrete => "concrete",
            Self::Silk => "silk",
            Self::Studio => "studio",
            Self::DarkStudio => "dark-studio",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Marble => "Professional product photography, close-up shot of the object placed on a polished white carrara marble podium. Soft cinematic lighting, realistic shadows, depth of field, 8k resolution, luxury aesthetic.",
            Self::Wood => "Professional product photography, object placed on a textured rustic oak wooden table. Warm sunlight coming from the side, dappled shadows, blurred nature background, cozy atmosphere, photorealistic.",
            Self::Concrete => "Professional product photography, object placed on a raw grey concrete surface. Hard dramatic lighting, high contrast, sharp shadows, urban minimalist style, 8k.",
            Self::Silk => "Professional product photography, object resting on flowing champagne-colored silk fabric. Softbox lighting, elegant reflections, fashion magazine style, macro details.",
            Self::Studio => "High-end commercial product photography, object placed on an infinity curve background. Three-point lighting setup, rim light to separate object from background, ultra sharp focus.",
            Self::DarkStudio => "Professional product photography, object placed on a matte black non-reflective surface. Dark studio background, clean, dramatic rim lighting highlighting the object contours, minimal shadows, no reflections.",
        }
    }
}

impl FromStr for ScenePreset {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| StudioError::invalid_config(format!("Unknown scene preset '{}'", s)))
    }
}

/// What the generated scene should look like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenePrompt {
    Preset(ScenePreset),
    /// Free-text description, wrapped in a product-photography template
    Custom(String),
}

impl ScenePrompt {
    #[must_use]
    pub fn custom<S: Into<String>>(text: S) -> Self {
        Self::Custom(text.into())
    }

    /// Preset name or free text
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.parse::<ScenePreset>()
            .map_or_else(|_| Self::custom(text.trim()), Self::Preset)
    }

    /// Scene description without the preservation instruction
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::Preset(preset) => preset.description().to_string(),
            Self::Custom(text) => format!(
                "Professional product photography shot of the object. {}. High quality, realistic lighting, 8k, photorealistic.",
                text.trim().trim_end_matches('.')
            ),
        }
    }

    /// Full prompt sent to the capability
    #[must_use]
    pub fn to_prompt(&self) -> String {
        format!("{} {}", self.description(), PRESERVATION_INSTRUCTION)
    }
}

impl fmt::Display for ScenePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preset(preset) => f.write_str(preset.name()),
            Self::Custom(text) => write!(f, "\"{}\"", text),
        }
    }
}

/// Request sent to a generative-edit capability
#[derive(Debug, Clone)]
pub struct EditRequest {
    /// Subject on a transparent square canvas, PNG
    pub image_png: Vec<u8>,
    /// Opaque where the subject must be preserved, transparent elsewhere, PNG
    pub mask_png: Vec<u8>,
    pub prompt: String,
    /// Side of the square output
    pub size: u32,
}

/// Capability answer: either the image itself or where to get it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditResponse {
    Inline(Vec<u8>),
    Reference(String),
}

/// External generative image-editing capability
#[async_trait]
pub trait GenerativeEditBackend: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// - Capability unreachable or answering with an error
    /// - Response without usable image data
    async fn edit(&self, request: EditRequest) -> Result<EditResponse>;
}

/// Produces whole scenes around a cutout through a [`GenerativeEditBackend`]
pub struct SceneGenerator {
    backend: Arc<dyn GenerativeEditBackend>,
    resolver: Arc<dyn ReferenceResolver>,
    config: GeneratorConfig,
}

impl fmt::Debug for SceneGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneGenerator")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SceneGenerator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerativeEditBackend>,
        resolver: Arc<dyn ReferenceResolver>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            backend,
            resolver,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Subject fitted to `subject_size` and centered on the working canvas
    #[must_use]
    pub fn prepare_canvas(&self, cutout: &Cutout) -> RgbaImage {
        place_subject(
            cutout,
            self.config.canvas_size,
            self.config.subject_size,
            0,
            0,
        )
    }

    /// Binary preserve mask: opaque black where alpha reaches the threshold
    #[must_use]
    pub fn preserve_mask(&self, canvas: &RgbaImage) -> RgbaImage {
        let threshold = self.config.mask_threshold;
        RgbaImage::from_fn(canvas.width(), canvas.height(), |x, y| {
            if canvas.get_pixel(x, y)[3] >= threshold {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    /// Regenerate everything around the subject
    ///
    /// # Errors
    /// - Cutout without visible pixels
    /// - Capability failure, timeout or malformed response
    /// - Reference that cannot be resolved
    /// - Returned bytes that do not decode
    pub async fn generate(&self, cutout: &Cutout, scene: &ScenePrompt) -> Result<RasterBuffer> {
        Ok(self.generate_composite(cutout, scene).await?.image)
    }

    /// Like [`SceneGenerator::generate`], also returning the placed subject
    /// layer so a transparent export can still be produced afterwards
    ///
    /// # Errors
    /// - Same as [`SceneGenerator::generate`]
    #[instrument(level = "info", skip_all, fields(backend = self.backend.name(), scene = %scene))]
    pub async fn generate_composite(
        &self,
        cutout: &Cutout,
        scene: &ScenePrompt,
    ) -> Result<CompositeResult> {
        if cutout.alpha().is_empty() {
            return Err(StudioError::generation(
                "Cutout has no visible foreground to build a scene around",
            ));
        }

        let canvas = self.prepare_canvas(cutout);
        let mask = self.preserve_mask(&canvas);
        let foreground = RasterBuffer::from_rgba(canvas);
        let request = EditRequest {
            image_png: ImageIOService::to_png_bytes(&foreground).map_err(Self::as_generation)?,
            mask_png: ImageIOService::to_png_bytes(&RasterBuffer::from_rgba(mask))
                .map_err(Self::as_generation)?,
            prompt: scene.to_prompt(),
            size: self.config.canvas_size,
        };

        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = tokio::time::timeout(timeout, self.backend.edit(request))
            .await
            .map_err(|_| {
                StudioError::generation(format!(
                    "{} did not answer within {}s",
                    self.backend.name(),
                    self.config.timeout_secs
                ))
            })?
            .map_err(Self::as_generation)?;

        let bytes = match response {
            EditResponse::Inline(bytes) => bytes,
            EditResponse::Reference(reference) => {
                log::debug!("Resolving generated scene reference {}", reference);
                self.resolver.resolve(&reference).await.map_err(|e| {
                    StudioError::generation(format!(
                        "Generated scene could not be retrieved: {}",
                        e
                    ))
                })?
            },
        };

        let scene_image = ImageIOService::decode(&bytes).map_err(|e| {
            StudioError::generation(format!("Generated scene is not a usable image: {}", e))
        })?;
        let scene_image = self.fit_to_canvas(scene_image);

        log::info!(
            "Generated {} scene in {}ms",
            scene,
            started.elapsed().as_millis()
        );
        CompositeResult::new(scene_image, foreground)
    }

    fn fit_to_canvas(&self, image: RasterBuffer) -> RasterBuffer {
        let size = self.config.canvas_size;
        if image.dimensions() == (size, size) {
            return image;
        }
        log::warn!(
            "Generated scene is {}x{}, expected {}x{}; resizing",
            image.width(),
            image.height(),
            size,
            size
        );
        resize_raster(&image, size, size)
    }

    fn as_generation(error: StudioError) -> StudioError {
        match error {
            StudioError::Generation(_) => error,
            other => StudioError::generation(other.to_string()),
        }
    }
}
