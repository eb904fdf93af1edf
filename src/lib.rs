#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Studio
//!
//! Turns a casual product photo into a polished studio shot: the subject is
//! separated from its original background, placed on a clean backdrop with an
//! optional contact shadow and floor reflection, cropped to a marketplace
//! aspect ratio and exported at a chosen resolution and print density.
//!
//! ## Features
//!
//! - **Foreground extraction** through a pluggable segmentation capability
//!   (HTTP service, luminance heuristic, mock) with mask refinement and a
//!   whole-frame fallback when segmentation fails
//! - **Local scenes**: flat colors, vertical gradients and user or remote
//!   backdrops, with soft contact shadows and fading reflections
//! - **Generated scenes** through a generative image edit capability, with the
//!   product pixels preserved by an edit mask
//! - **Marketplace crops**: 1:1, 4:5, 3:4, 9:16, 16:9 and 4:3
//! - **Export** to PNG (with `pHYs` density), JPEG (with JFIF density) and
//!   lossy WebP with alpha
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_studio::{
//!     AspectRatio, BackgroundKind, Color, ExportSpec, OutputFormat, ProcessorConfig,
//!     RenderRequest, SceneSpec, StudioProcessor,
//! };
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let processor = StudioProcessor::new(ProcessorConfig::default())?;
//!
//! let scene = SceneSpec::builder()
//!     .background(BackgroundKind::Flat(Color::BEIGE))
//!     .shadow(true)
//!     .build();
//! let export = ExportSpec::builder()
//!     .format(OutputFormat::Jpeg)
//!     .target_edge(2048)
//!     .dpi(300)
//!     .build()?;
//! let request = RenderRequest::new(scene, export).with_aspect(AspectRatio::Portrait4x5);
//!
//! let output = processor.render(&upload, &request).await?;
//! std::fs::write(output.image.file_name("sneaker"), &output.image.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface, spinner and tracing subscriber setup
//! - `webp-support` (default): WebP decoding and lossy WebP export
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! imgly-studio = { version = "0.1", default-features = false, features = ["webp-support"] }
//! ```

pub mod background;
pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod crop;
pub mod effects;
pub mod error;
pub mod export;
pub mod extractor;
pub mod fetch;
pub mod generation;
pub mod mask;
pub mod processor;
pub mod resample;
pub mod scene;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

use tokio::io::AsyncRead;

// Public API exports
pub use backends::{
    HttpSegmentationBackend, LuminanceBackend, MockBackend, OpenAiImageEditBackend,
    ResponseFormat,
};
pub use background::BackgroundBuilder;
pub use config::{
    BackgroundKind, Color, ExportSpec, ExtractorConfig, FetchConfig, GeneratorConfig,
    GradientPreset, GradientStops, MaskRefinementProfile, OutputFormat, ReflectionConfig,
    SceneSpec, ShadowConfig, StudioConfig,
};
pub use crop::{AspectRatio, CropEngine};
pub use effects::EffectsSynthesizer;
pub use error::{ErrorKind, Result, StudioError};
pub use export::{ExportEncoder, ExportedImage};
pub use extractor::{Extraction, ForegroundExtractor};
pub use fetch::{ImageFetcher, ReferenceResolver};
pub use generation::{
    EditRequest, EditResponse, GenerativeEditBackend, SceneGenerator, ScenePreset, ScenePrompt,
};
pub use mask::MaskRefiner;
pub use processor::{
    BackendFactory, BackendType, DefaultBackendFactory, ProcessorConfig, ProcessorConfigBuilder,
    RenderOutput, RenderRequest, StudioProcessor,
};
pub use scene::SceneComposer;
pub use segmentation::{MattingThresholds, SegmentationBackend};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressUpdate,
};
pub use types::{AlphaMask, BoundingBox, CompositeResult, Cutout, RasterBuffer, RenderTimings};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Render an upload provided as bytes with a one-off processor
///
/// Suitable for scripts and one-shot jobs. Services rendering repeatedly
/// should keep a [`StudioProcessor`] around instead.
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_studio::{render_from_bytes, ProcessorConfig, RenderRequest};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let output = render_from_bytes(&upload, &RenderRequest::default(), ProcessorConfig::default()).await?;
/// assert_eq!(output.image.mime_type(), "image/png");
/// # Ok(())
/// # }
/// ```
pub async fn render_from_bytes(
    image_bytes: &[u8],
    request: &RenderRequest,
    config: ProcessorConfig,
) -> Result<RenderOutput> {
    let processor = StudioProcessor::new(config)?;
    processor.render(image_bytes, request).await
}

/// Render an upload read from an async stream
///
/// # Examples
///
/// ```rust,no_run
/// use imgly_studio::{render_from_reader, ProcessorConfig, RenderRequest};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("product.jpg").await?;
/// let output = render_from_reader(file, &RenderRequest::default(), ProcessorConfig::default()).await?;
/// tokio::fs::write(output.image.file_name("product"), &output.image.bytes).await?;
/// # Ok(())
/// # }
/// ```
pub async fn render_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    request: &RenderRequest,
    config: ProcessorConfig,
) -> Result<RenderOutput> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| StudioError::decode(format!("Failed to read from stream: {}", e)))?;
    render_from_bytes(&buffer, request, config).await
}
