//! Configuration types for studio rendering and export

use crate::{
    error::{Result, StudioError},
    generation::ScenePrompt,
    types::RasterBuffer,
};
use image::{Rgb, Rgba};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Opaque 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// Cream backdrop used for warm product shots
    pub const BEIGE: Self = Self::new(245, 245, 220);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn to_rgb(self) -> Rgb<u8> {
        Rgb([self.r, self.g, self.b])
    }

    #[must_use]
    pub fn to_rgba(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }

    /// Linear interpolation, `t` in 0.0..=1.0
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Self::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Color {
    type Err = StudioError;

    /// Parses `#rrggbb`, `rrggbb` or one of the named presets
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            "beige" | "cream" => return Ok(Self::BEIGE),
            _ => {},
        }

        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StudioError::invalid_config(format!(
                "Invalid color '{}': expected #rrggbb or white/black/beige",
                s
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| StudioError::invalid_config(format!("Invalid color '{}'", s)))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// Two-stop vertical gradient, `top` at row 0 and `bottom` at the last row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientStops {
    pub top: Color,
    pub bottom: Color,
}

/// Built-in gradient backdrops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientPreset {
    /// Light-to-mid neutral gray studio sweep
    StudioGray,
    /// Brand blue fading into near-white
    Brand,
    /// Warm cream sweep
    Cream,
    /// Charcoal to black
    Midnight,
}

impl GradientPreset {
    #[must_use]
    pub fn stops(self) -> GradientStops {
        match self {
            Self::StudioGray => GradientStops {
                top: Color::new(245, 245, 247),
                bottom: Color::new(200, 202, 206),
            },
            Self::Brand => GradientStops {
                top: Color::new(0, 122, 255),
                bottom: Color::new(232, 240, 255),
            },
            Self::Cream => GradientStops {
                top: Color::new(252, 250, 242),
                bottom: Color::BEIGE,
            },
            Self::Midnight => GradientStops {
                top: Color::new(44, 46, 52),
                bottom: Color::new(11, 11, 12),
            },
        }
    }
}

impl FromStr for GradientPreset {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gray" | "grey" | "studio-gray" => Ok(Self::StudioGray),
            "brand" => Ok(Self::Brand),
            "cream" => Ok(Self::Cream),
            "midnight" | "dark" => Ok(Self::Midnight),
            other => Err(StudioError::invalid_config(format!(
                "Unknown gradient preset '{}' (expected gray, brand, cream or midnight)",
                other
            ))),
        }
    }
}

/// Closed set of backdrop variants for a render
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundKind {
    /// Solid color
    Flat(Color),
    /// Two-stop vertical gradient
    Gradient(GradientStops),
    /// Uploaded or fetched raster, fit-and-cropped to the canvas
    External(RasterBuffer),
    /// Whole scene produced by the generative-edit capability
    Generated(ScenePrompt),
}

impl Default for BackgroundKind {
    fn default() -> Self {
        Self::Flat(Color::WHITE)
    }
}

impl BackgroundKind {
    #[must_use]
    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }
}

/// Composition parameters for one render
///
/// # Examples
/// ```rust
/// use imgly_studio::config::{BackgroundKind, Color, SceneSpec};
///
/// let spec = SceneSpec::builder()
///     .background(BackgroundKind::Flat(Color::BEIGE))
///     .scale_percent(500)
///     .shadow(true)
///     .build();
/// assert_eq!(spec.scale_percent, SceneSpec::MAX_SCALE_PERCENT);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSpec {
    pub background: BackgroundKind,
    /// Side of the square canvas in pixels
    pub canvas_size: u32,
    /// Subject's longer side as a percentage of the canvas side
    pub scale_percent: u32,
    /// Horizontal shift from center, positive to the right
    pub offset_x: i32,
    /// Vertical shift from center, positive downwards
    pub offset_y: i32,
    pub shadow: bool,
    pub reflection: bool,
}

impl SceneSpec {
    pub const DEFAULT_CANVAS_SIZE: u32 = 1024;
    pub const MIN_CANVAS_SIZE: u32 = 16;
    pub const MAX_CANVAS_SIZE: u32 = 8192;
    pub const DEFAULT_SCALE_PERCENT: u32 = 85;
    pub const MIN_SCALE_PERCENT: u32 = 40;
    pub const MAX_SCALE_PERCENT: u32 = 160;

    #[must_use]
    pub fn builder() -> SceneSpecBuilder {
        SceneSpecBuilder::default()
    }

    /// Scale percentage forced into the supported range
    #[must_use]
    pub fn clamped_scale_percent(&self) -> u32 {
        self.scale_percent
            .clamp(Self::MIN_SCALE_PERCENT, Self::MAX_SCALE_PERCENT)
    }

    /// # Errors
    /// - Canvas size outside 16-8192
    pub fn validate(&self) -> Result<()> {
        if !(Self::MIN_CANVAS_SIZE..=Self::MAX_CANVAS_SIZE).contains(&self.canvas_size) {
            return Err(StudioError::config_value_error(
                "canvas size",
                self.canvas_size,
                "16-8192",
                Some(Self::DEFAULT_CANVAS_SIZE),
            ));
        }
        Ok(())
    }
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            background: BackgroundKind::default(),
            canvas_size: Self::DEFAULT_CANVAS_SIZE,
            scale_percent: Self::DEFAULT_SCALE_PERCENT,
            offset_x: 0,
            offset_y: 0,
            shadow: false,
            reflection: false,
        }
    }
}

/// Builder for [`SceneSpec`]
#[derive(Debug, Default)]
pub struct SceneSpecBuilder {
    spec: SceneSpec,
}

impl SceneSpecBuilder {
    #[must_use]
    pub fn background(mut self, background: BackgroundKind) -> Self {
        self.spec.background = background;
        self
    }

    #[must_use]
    pub fn canvas_size(mut self, size: u32) -> Self {
        self.spec.canvas_size = size;
        self
    }

    /// Clamped to 40-160
    #[must_use]
    pub fn scale_percent(mut self, percent: u32) -> Self {
        self.spec.scale_percent =
            percent.clamp(SceneSpec::MIN_SCALE_PERCENT, SceneSpec::MAX_SCALE_PERCENT);
        self
    }

    #[must_use]
    pub fn offset(mut self, x: i32, y: i32) -> Self {
        self.spec.offset_x = x;
        self.spec.offset_y = y;
        self
    }

    #[must_use]
    pub fn shadow(mut self, enabled: bool) -> Self {
        self.spec.shadow = enabled;
        self
    }

    #[must_use]
    pub fn reflection(mut self, enabled: bool) -> Self {
        self.spec.reflection = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> SceneSpec {
        self.spec
    }
}

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless with alpha
    Png,
    /// Lossy, no alpha (flattened onto the matte color)
    Jpeg,
    /// Lossy with alpha
    WebP,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
        }
    }

    /// Largest edge the encoder accepts
    #[must_use]
    pub fn max_edge(self) -> u32 {
        match self {
            // libwebp caps dimensions at 16383
            Self::WebP => 16_383,
            Self::Png | Self::Jpeg => ExportSpec::MAX_TARGET_EDGE,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(StudioError::encode(format!(
                "Unsupported output format '{}' (expected png, jpeg or webp)",
                other
            ))),
        }
    }
}

/// Export parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSpec {
    pub format: OutputFormat,
    /// Longest edge of the encoded image in pixels
    pub target_edge: u32,
    /// Lossy quality, 1-100 (JPEG and WebP)
    pub quality: u8,
    /// Lossless compression level, 0-9 (PNG)
    pub compression: u8,
    /// Pixel density metadata
    pub dpi: u32,
    /// Drop the composed background and emit the foreground on transparency
    pub transparent: bool,
    /// Color alpha is flattened onto when the format has no alpha channel
    pub matte: Color,
}

impl ExportSpec {
    pub const DEFAULT_TARGET_EDGE: u32 = 1024;
    pub const MAX_TARGET_EDGE: u32 = 16384;
    pub const DEFAULT_QUALITY: u8 = 90;
    pub const DEFAULT_COMPRESSION: u8 = 6;
    /// Print-ready default
    pub const DEFAULT_DPI: u32 = 300;
    pub const MAX_DPI: u32 = 2400;

    #[must_use]
    pub fn builder() -> ExportSpecBuilder {
        ExportSpecBuilder::default()
    }

    /// Reject parameter combinations the encoder cannot honor
    ///
    /// # Errors
    /// - Transparent override on a format without an alpha channel
    /// - Quality, compression, target edge or DPI out of range
    pub fn validate(&self) -> Result<()> {
        if self.transparent && !crate::services::OutputFormatHandler::supports_transparency(self.format)
        {
            return Err(StudioError::encode(format!(
                "Transparent background requested but {:?} has no alpha channel",
                self.format
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(StudioError::export_value_error("quality", self.quality, "1-100"));
        }
        if self.compression > 9 {
            return Err(StudioError::export_value_error(
                "compression",
                self.compression,
                "0-9",
            ));
        }
        let max_edge = self.format.max_edge();
        if !(1..=max_edge).contains(&self.target_edge) {
            return Err(StudioError::export_value_error(
                "target edge",
                self.target_edge,
                &format!("1-{} for {}", max_edge, self.format.as_str()),
            ));
        }
        if !(1..=Self::MAX_DPI).contains(&self.dpi) {
            return Err(StudioError::export_value_error("dpi", self.dpi, "1-2400"));
        }
        Ok(())
    }
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            format: OutputFormat::Png,
            target_edge: Self::DEFAULT_TARGET_EDGE,
            quality: Self::DEFAULT_QUALITY,
            compression: Self::DEFAULT_COMPRESSION,
            dpi: Self::DEFAULT_DPI,
            transparent: false,
            matte: Color::WHITE,
        }
    }
}

/// Builder for [`ExportSpec`]
///
/// Setters store values as given; range checks happen in
/// [`ExportSpec::validate`] so bad requests surface as encode errors.
#[derive(Debug, Default)]
pub struct ExportSpecBuilder {
    spec: ExportSpec,
}

impl ExportSpecBuilder {
    #[must_use]
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.spec.format = format;
        self
    }

    #[must_use]
    pub fn target_edge(mut self, edge: u32) -> Self {
        self.spec.target_edge = edge;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.spec.quality = quality;
        self
    }

    #[must_use]
    pub fn compression(mut self, level: u8) -> Self {
        self.spec.compression = level;
        self
    }

    #[must_use]
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.spec.dpi = dpi;
        self
    }

    #[must_use]
    pub fn transparent(mut self, transparent: bool) -> Self {
        self.spec.transparent = transparent;
        self
    }

    #[must_use]
    pub fn matte(mut self, color: Color) -> Self {
        self.spec.matte = color;
        self
    }

    /// # Errors
    /// See [`ExportSpec::validate`]
    pub fn build(self) -> Result<ExportSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Ordered alpha refinement operators applied to every segmentation result
///
/// Order is fixed: median denoise, halo threshold (optionally hardening the
/// edge to fully opaque), dilation, erosion, Gaussian re-soften. A stage is
/// skipped when its parameter is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskRefinementProfile {
    /// Median filter radius in pixels
    pub median_radius: u32,
    /// Alpha values below this become fully transparent
    pub halo_threshold: u8,
    /// Values at or above the threshold become fully opaque
    pub harden: bool,
    /// Dilation passes (one pixel each, chessboard distance)
    pub dilate_iterations: u8,
    /// Erosion passes (one pixel each, chessboard distance)
    pub erode_iterations: u8,
    /// Gaussian sigma of the final re-soften
    pub blur_sigma: f32,
}

impl MaskRefinementProfile {
    /// Profile that leaves the mask untouched
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            median_radius: 0,
            halo_threshold: 0,
            harden: false,
            dilate_iterations: 0,
            erode_iterations: 0,
            blur_sigma: 0.0,
        }
    }

    /// # Errors
    /// - Non-finite or negative blur sigma, sigma above 10
    /// - Median radius above 8
    pub fn validate(&self) -> Result<()> {
        if !self.blur_sigma.is_finite() || !(0.0..=10.0).contains(&self.blur_sigma) {
            return Err(StudioError::config_value_error(
                "blur sigma",
                self.blur_sigma,
                "0.0-10.0",
                Some(0.6),
            ));
        }
        if self.median_radius > 8 {
            return Err(StudioError::config_value_error(
                "median radius",
                self.median_radius,
                "0-8",
                Some(1),
            ));
        }
        Ok(())
    }
}

impl Default for MaskRefinementProfile {
    fn default() -> Self {
        Self {
            median_radius: 1,
            halo_threshold: 10,
            harden: true,
            dilate_iterations: 1,
            erode_iterations: 1,
            blur_sigma: 0.6,
        }
    }
}

/// Foreground extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Inputs larger than this on either side are downscaled first
    pub max_dimension: u32,
    /// Matting confidence for definite foreground
    pub foreground_threshold: u8,
    /// Matting confidence for definite background
    pub background_threshold: u8,
    /// Timeout for the segmentation call
    pub timeout_secs: u64,
    pub refinement: MaskRefinementProfile,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1200,
            foreground_threshold: 240,
            background_threshold: 10,
            timeout_secs: 20,
            refinement: MaskRefinementProfile::default(),
        }
    }
}

/// Contact shadow settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Ellipse height as a fraction of the subject height
    pub height_ratio: f32,
    /// Ellipse width as a fraction of the subject width
    pub width_ratio: f32,
    /// Peak opacity, 0.0-1.0
    pub opacity: f32,
    /// Blur sigma as a fraction of the ellipse height
    pub blur_factor: f32,
    pub color: Color,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            height_ratio: 0.2,
            width_ratio: 0.9,
            opacity: 0.45,
            blur_factor: 0.35,
            color: Color::BLACK,
        }
    }
}

/// Floor reflection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Opacity of the reflection's first row
    pub start_opacity: f32,
    /// Opacity reached at the end of the fade
    pub end_opacity: f32,
    /// Fraction of the reflection height the fade spans
    pub fade_fraction: f32,
    /// Pixels between the subject's lowest row and the reflection
    pub gap: u32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            start_opacity: 0.35,
            end_opacity: 0.0,
            fade_fraction: 0.6,
            gap: 4,
        }
    }
}

/// Generative scene settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Side of the square canvas sent to the capability
    pub canvas_size: u32,
    /// Longer side of the subject on that canvas
    pub subject_size: u32,
    /// Alpha at or above this is preserved, below is regenerated
    pub mask_threshold: u8,
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            canvas_size: 1024,
            subject_size: 850,
            mask_threshold: 128,
            timeout_secs: 40,
        }
    }
}

/// Remote image download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Refuse bodies larger than this
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Complete configuration file for the studio pipeline
///
/// Every section falls back to its defaults when omitted, so a JSON file may
/// override a single field:
///
/// ```rust
/// use imgly_studio::config::StudioConfig;
///
/// let config = StudioConfig::from_json(r#"{ "shadow": { "opacity": 0.3 } }"#).unwrap();
/// assert!((config.shadow.opacity - 0.3).abs() < f32::EPSILON);
/// assert_eq!(config.extractor.max_dimension, 1200);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudioConfig {
    pub extractor: ExtractorConfig,
    pub shadow: ShadowConfig,
    pub reflection: ReflectionConfig,
    pub generator: GeneratorConfig,
    pub fetch: FetchConfig,
    pub export: ExportSpec,
}

impl StudioConfig {
    /// # Errors
    /// - Malformed JSON
    /// - Values failing [`StudioConfig::validate`]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| StudioError::invalid_config(format!("Invalid studio config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// - File cannot be read
    /// - Contents fail [`StudioConfig::from_json`]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StudioError::file_io_error("read config file", path, &e))?;
        Self::from_json(&content)
    }

    /// # Errors
    /// - Refinement profile out of range
    /// - Opacity values outside 0.0-1.0
    /// - Zero-sized generator canvas or subject larger than it
    /// - Export defaults failing [`ExportSpec::validate`]
    pub fn validate(&self) -> Result<()> {
        self.extractor.refinement.validate()?;

        if self.extractor.max_dimension < 16 {
            return Err(StudioError::config_value_error(
                "max dimension",
                self.extractor.max_dimension,
                ">= 16",
                Some(1200),
            ));
        }

        for (name, value) in [
            ("shadow opacity", self.shadow.opacity),
            ("reflection start opacity", self.reflection.start_opacity),
            ("reflection end opacity", self.reflection.end_opacity),
            ("reflection fade fraction", self.reflection.fade_fraction),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(StudioError::config_value_error(name, value, "0.0-1.0", None));
            }
        }

        if self.generator.canvas_size == 0
            || self.generator.subject_size == 0
            || self.generator.subject_size > self.generator.canvas_size
        {
            return Err(StudioError::invalid_config(format!(
                "Generator subject size {} must be between 1 and the canvas size {}",
                self.generator.subject_size, self.generator.canvas_size
            )));
        }

        self.export.validate()
    }
}
