//! Unified studio render processor
//!
//! `StudioProcessor` runs the whole pipeline for one upload: decode, extract,
//! compose (locally or through the generative-edit capability), crop and
//! export. The CLI and embedding services both go through it so they share
//! validation order and error semantics.

use crate::{
    backends::{HttpSegmentationBackend, LuminanceBackend, MockBackend},
    config::{
        BackgroundKind, ExportSpec, MaskRefinementProfile, ReflectionConfig, SceneSpec,
        ShadowConfig, StudioConfig,
    },
    crop::{AspectRatio, CropEngine},
    error::{Result, StudioError},
    export::{ExportEncoder, ExportedImage},
    extractor::ForegroundExtractor,
    fetch::{ImageFetcher, ReferenceResolver},
    generation::{GenerativeEditBackend, SceneGenerator},
    resample::resize_raster,
    scene::SceneComposer,
    segmentation::SegmentationBackend,
    services::{
        ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
    },
    types::{CompositeResult, RenderTimings},
};
use instant::{Duration, Instant};
use log::{debug, info};
use std::{fmt, path::Path, sync::Arc};
use tracing::instrument;

/// Segmentation backend selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendType {
    /// Remote segmentation service
    Http,
    /// Border-luminance heuristic, only for light studio backdrops
    Luminance,
    /// Passes the source alpha through (tests, offline runs)
    Mock,
}

impl std::str::FromStr for BackendType {
    type Err = StudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" | "remote" => Ok(Self::Http),
            "luminance" | "quick" => Ok(Self::Luminance),
            "mock" => Ok(Self::Mock),
            other => Err(StudioError::invalid_config(format!(
                "Unknown segmentation backend '{}'. Supported: http, luminance, mock",
                other
            ))),
        }
    }
}

/// Factory trait for creating segmentation backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend of the given type for `config`
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - Unsupported backend types
    /// - Missing endpoint for the HTTP backend
    /// - HTTP client construction failures
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &ProcessorConfig,
    ) -> Result<Arc<dyn SegmentationBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Builds every backend shipped with the crate
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &ProcessorConfig,
    ) -> Result<Arc<dyn SegmentationBackend>> {
        match backend_type {
            BackendType::Http => {
                let endpoint = config.segmenter_url.as_deref().ok_or_else(|| {
                    StudioError::invalid_config("HTTP segmentation needs a service URL")
                })?;
                let timeout = Duration::from_secs(config.studio.extractor.timeout_secs);
                let mut backend = HttpSegmentationBackend::new(endpoint, timeout)?;
                if let Some(key) = &config.segmenter_api_key {
                    backend = backend.with_api_key(key.clone());
                }
                Ok(Arc::new(backend))
            },
            BackendType::Luminance => Ok(Arc::new(LuminanceBackend::default())),
            BackendType::Mock => Ok(Arc::new(MockBackend::new())),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Http, BackendType::Luminance, BackendType::Mock]
    }
}

/// Unified configuration for the studio processor
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Tunables for every pipeline stage
    pub studio: StudioConfig,
    /// Segmentation backend to build
    pub backend_type: BackendType,
    /// Segmentation service endpoint (HTTP backend)
    pub segmenter_url: Option<String>,
    /// Bearer token for the segmentation service
    pub segmenter_api_key: Option<String>,
    /// Report elapsed time with every stage
    pub verbose_progress: bool,
}

impl ProcessorConfig {
    /// Create a new processor configuration builder
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// # Errors
    /// - Studio tunables out of range
    /// - HTTP backend selected without an endpoint
    pub fn validate(&self) -> Result<()> {
        self.studio.validate()?;
        if self.backend_type == BackendType::Http && self.segmenter_url.is_none() {
            return Err(StudioError::invalid_config(
                "HTTP segmentation backend selected but no service URL was given",
            ));
        }
        Ok(())
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            studio: StudioConfig::default(),
            backend_type: BackendType::Luminance,
            segmenter_url: None,
            segmenter_api_key: None,
            verbose_progress: false,
        }
    }
}

/// Builder for `ProcessorConfig`
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
        }
    }

    #[must_use]
    pub fn studio_config(mut self, studio: StudioConfig) -> Self {
        self.config.studio = studio;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Use the HTTP segmentation service at `url`
    #[must_use]
    pub fn segmenter_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.segmenter_url = Some(url.into());
        self.config.backend_type = BackendType::Http;
        self
    }

    #[must_use]
    pub fn segmenter_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.segmenter_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, max: u32) -> Self {
        self.config.studio.extractor.max_dimension = max.clamp(16, 8192);
        self
    }

    #[must_use]
    pub fn segmentation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.studio.extractor.timeout_secs = secs.clamp(1, 600);
        self
    }

    #[must_use]
    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.studio.generator.timeout_secs = secs.clamp(1, 600);
        self
    }

    #[must_use]
    pub fn refinement(mut self, profile: MaskRefinementProfile) -> Self {
        self.config.studio.extractor.refinement = profile;
        self
    }

    #[must_use]
    pub fn shadow(mut self, shadow: ShadowConfig) -> Self {
        self.config.studio.shadow = shadow;
        self
    }

    #[must_use]
    pub fn reflection(mut self, reflection: ReflectionConfig) -> Self {
        self.config.studio.reflection = reflection;
        self
    }

    #[must_use]
    pub fn verbose_progress(mut self, verbose: bool) -> Self {
        self.config.verbose_progress = verbose;
        self
    }

    /// Build the processor configuration
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - Tunables failing [`StudioConfig::validate`]
    /// - HTTP backend without an endpoint
    pub fn build(self) -> Result<ProcessorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a single render needs besides the upload itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderRequest {
    /// Scene to compose or generate
    pub scene: SceneSpec,
    /// Optional final aspect-ratio crop
    pub aspect: Option<AspectRatio>,
    /// Encoding parameters
    pub export: ExportSpec,
    /// Remote backdrop; replaces a local background when set
    pub background_url: Option<String>,
}

impl RenderRequest {
    #[must_use]
    pub fn new(scene: SceneSpec, export: ExportSpec) -> Self {
        Self {
            scene,
            export,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_aspect(mut self, aspect: AspectRatio) -> Self {
        self.aspect = Some(aspect);
        self
    }

    #[must_use]
    pub fn with_background_url<S: Into<String>>(mut self, url: S) -> Self {
        self.background_url = Some(url.into());
        self
    }
}

/// Encoded result of a render
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub image: ExportedImage,
    pub timings: RenderTimings,
    /// Set when segmentation failed and the whole frame was used as foreground
    pub segmentation_fallback: Option<String>,
}

impl RenderOutput {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.segmentation_fallback.is_some()
    }
}

/// Runs decode → extract → compose/generate → crop → export
///
/// Renders hold several full-resolution buffers at once. Callers serving
/// many users should run at most one render per session at a time.
pub struct StudioProcessor {
    config: ProcessorConfig,
    extractor: ForegroundExtractor,
    composer: SceneComposer,
    generator: Option<SceneGenerator>,
    fetcher: Option<Arc<ImageFetcher>>,
    progress_reporter: Box<dyn ProgressReporter>,
}

impl fmt::Debug for StudioProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudioProcessor")
            .field("config", &self.config)
            .field("extractor", &self.extractor)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

impl StudioProcessor {
    /// Create a processor with the default backend factory
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - Invalid processor configuration
    /// - Backend or HTTP client construction failures
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Create a processor whose segmentation backend comes from `factory`
    ///
    /// # Errors
    ///
    /// Same as [`StudioProcessor::new`]
    pub fn with_factory(config: ProcessorConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;
        let backend = factory.create_backend(config.backend_type, &config)?;
        Self::with_backend(config, backend)
    }

    /// Create a processor around an already built segmentation backend
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - Tunables failing [`StudioConfig::validate`]
    /// - HTTP client construction failures for the background fetcher
    pub fn with_backend(
        config: ProcessorConfig,
        backend: Arc<dyn SegmentationBackend>,
    ) -> Result<Self> {
        config.studio.validate()?;
        info!("Initializing studio processor with {} segmentation", backend.name());

        let studio = &config.studio;
        let extractor = ForegroundExtractor::new(backend, studio.extractor.clone());
        let composer = SceneComposer::new(studio.shadow, studio.reflection);
        let fetcher = Arc::new(ImageFetcher::new(&studio.fetch)?);
        let progress_reporter: Box<dyn ProgressReporter> = if config.verbose_progress {
            Box::new(crate::services::ConsoleProgressReporter::new(true))
        } else {
            Box::new(NoOpProgressReporter)
        };

        Ok(Self {
            config,
            extractor,
            composer,
            generator: None,
            fetcher: Some(fetcher),
            progress_reporter,
        })
    }

    /// Enable generated scenes through `backend`
    ///
    /// References returned by the backend are resolved with the processor's
    /// background fetcher unless a resolver is given.
    ///
    /// # Errors
    /// - No resolver given and the processor has no fetcher
    pub fn with_generator(
        mut self,
        backend: Arc<dyn GenerativeEditBackend>,
        resolver: Option<Arc<dyn ReferenceResolver>>,
    ) -> Result<Self> {
        let resolver = match resolver {
            Some(resolver) => resolver,
            None => self
                .fetcher
                .clone()
                .map(|fetcher| fetcher as Arc<dyn ReferenceResolver>)
                .ok_or_else(|| {
                    StudioError::invalid_config(
                        "Generated scenes need a resolver for hosted results",
                    )
                })?,
        };
        debug!("Generated scenes enabled through {}", backend.name());
        self.generator = Some(SceneGenerator::new(
            backend,
            resolver,
            self.config.studio.generator.clone(),
        ));
        Ok(self)
    }

    /// Refuse remote backgrounds
    #[must_use]
    pub fn without_fetcher(mut self) -> Self {
        self.fetcher = None;
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress_reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    #[must_use]
    pub fn supports_generation(&self) -> bool {
        self.generator.is_some()
    }

    /// Render an image file
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - File I/O errors when reading input
    /// - Everything [`StudioProcessor::render`] reports
    pub async fn render_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        request: &RenderRequest,
    ) -> Result<RenderOutput> {
        let path = input_path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StudioError::file_io_error("read input image", path, &e))?;
        self.render(&bytes, request).await
    }

    /// Render encoded `bytes` into a finished export
    ///
    /// Export parameters are checked before any decoding or network call, so
    /// an invalid request never reaches the segmentation capability.
    ///
    /// # Errors
    ///
    /// Returns `StudioError` for:
    /// - `Encode`: invalid export parameters or encoder failure
    /// - `InvalidConfig`: invalid scene, or a generated scene without a generator
    /// - `Decode`: unreadable upload
    /// - `Fetch`: remote background unavailable
    /// - `Generation`: generative-edit failure (no local substitute is used)
    #[instrument(
        skip_all,
        fields(
            input_bytes = bytes.len(),
            canvas = request.scene.canvas_size,
            format = ?request.export.format
        )
    )]
    pub async fn render(&self, bytes: &[u8], request: &RenderRequest) -> Result<RenderOutput> {
        let total_start = Instant::now();
        let mut timings = RenderTimings::new();

        self.report(ProcessingStage::Validation, total_start);
        self.check(ProcessingStage::Validation, self.validate_request(request))?;

        self.report(ProcessingStage::ImageLoading, total_start);
        let stage_start = Instant::now();
        let raw = self.check(ProcessingStage::ImageLoading, ImageIOService::decode(bytes))?;
        timings.decode_ms = elapsed_ms(stage_start);
        debug!("Decoded {}x{} upload", raw.width(), raw.height());

        self.report(ProcessingStage::Extraction, total_start);
        let stage_start = Instant::now();
        let extraction = self.extractor.extract_detailed(raw).await;
        timings.extraction_ms = elapsed_ms(stage_start);
        if let Some(reason) = &extraction.fallback_reason {
            self.progress_reporter
                .report_error(ProcessingStage::Extraction, reason);
        }

        let stage_start = Instant::now();
        let composite = self
            .build_scene(&extraction.cutout, request, total_start)
            .await?;
        timings.composition_ms = elapsed_ms(stage_start);

        let composite = match request.aspect {
            Some(ratio) => {
                self.report(ProcessingStage::Cropping, total_start);
                let stage_start = Instant::now();
                let cropped = self.check(
                    ProcessingStage::Cropping,
                    CropEngine::crop_composite(composite, ratio),
                )?;
                timings.crop_ms = elapsed_ms(stage_start);
                cropped
            },
            None => composite,
        };

        self.report(ProcessingStage::Encoding, total_start);
        let stage_start = Instant::now();
        let image = self.check(
            ProcessingStage::Encoding,
            ExportEncoder::export_composite(&composite, &request.export),
        )?;
        timings.encode_ms = elapsed_ms(stage_start);
        timings.total_ms = elapsed_ms(total_start);

        self.report(ProcessingStage::Completed, total_start);
        self.progress_reporter.report_completion(&timings);
        info!(
            "Rendered {}x{} {} ({} bytes) in {}ms",
            image.width,
            image.height,
            image.mime_type(),
            image.len(),
            timings.total_ms
        );

        Ok(RenderOutput {
            image,
            timings,
            segmentation_fallback: extraction.fallback_reason,
        })
    }

    fn validate_request(&self, request: &RenderRequest) -> Result<()> {
        request.export.validate()?;
        request.scene.validate()?;
        if request.background_url.is_some() && self.fetcher.is_none() {
            return Err(StudioError::invalid_config(
                "Remote backgrounds are disabled for this processor",
            ));
        }
        if request.scene.background.is_generated()
            && request.background_url.is_none()
            && self.generator.is_none()
        {
            return Err(StudioError::invalid_config(
                "Generated scenes are not configured for this processor",
            ));
        }
        Ok(())
    }

    async fn build_scene(
        &self,
        cutout: &crate::types::Cutout,
        request: &RenderRequest,
        total_start: Instant,
    ) -> Result<CompositeResult> {
        let scene = &request.scene;

        if let (Some(url), Some(fetcher)) = (&request.background_url, &self.fetcher) {
            self.report(ProcessingStage::BackgroundFetch, total_start);
            let backdrop = self.check(
                ProcessingStage::BackgroundFetch,
                fetcher.fetch_image(url).await,
            )?;
            self.report(ProcessingStage::Composition, total_start);
            return self.check(
                ProcessingStage::Composition,
                self.composer
                    .compose_over(cutout, scene, backdrop.into_rgba8()),
            );
        }

        match (&scene.background, &self.generator) {
            (BackgroundKind::Generated(prompt), Some(generator)) => {
                self.report(ProcessingStage::Generation, total_start);
                let generated = self.check(
                    ProcessingStage::Generation,
                    generator.generate_composite(cutout, prompt).await,
                )?;
                fit_composite(generated, scene.canvas_size)
            },
            _ => {
                self.report(ProcessingStage::Composition, total_start);
                self.check(
                    ProcessingStage::Composition,
                    self.composer.compose(cutout, scene),
                )
            },
        }
    }

    fn report(&self, stage: ProcessingStage, start: Instant) {
        self.progress_reporter
            .report_progress(ProgressUpdate::new(stage, start));
    }

    fn check<T>(&self, stage: ProcessingStage, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.progress_reporter.report_error(stage, &e.to_string());
        }
        result
    }
}

/// Bring a generated composite to the requested canvas size
fn fit_composite(composite: CompositeResult, canvas_size: u32) -> Result<CompositeResult> {
    if (composite.width, composite.height) == (canvas_size, canvas_size) {
        return Ok(composite);
    }
    debug!(
        "Resizing {}x{} generated scene to {}px canvas",
        composite.width, composite.height, canvas_size
    );
    CompositeResult::new(
        resize_raster(&composite.image, canvas_size, canvas_size),
        resize_raster(&composite.foreground, canvas_size, canvas_size),
    )
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Color, OutputFormat},
        generation::{EditRequest, EditResponse, ScenePrompt},
        types::RasterBuffer,
    };
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    fn product_png() -> Vec<u8> {
        let image = RgbaImage::from_fn(200, 100, |x, y| {
            if (50..150).contains(&x) && (20..80).contains(&y) {
                Rgba([120, 40, 40, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        ImageIOService::to_png_bytes(&RasterBuffer::from_rgba(image)).unwrap()
    }

    fn processor_with(backend: MockBackend) -> StudioProcessor {
        let config = ProcessorConfig::builder()
            .backend_type(BackendType::Mock)
            .build()
            .unwrap();
        StudioProcessor::with_backend(config, Arc::new(backend)).unwrap()
    }

    struct FixedScene {
        size: u32,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeEditBackend for FixedScene {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn edit(&self, _request: EditRequest) -> Result<EditResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let scene = RgbaImage::from_pixel(self.size, self.size, Rgba([30, 90, 30, 255]));
            Ok(EditResponse::Inline(
                ImageIOService::to_png_bytes(&RasterBuffer::from_rgba(scene)).unwrap(),
            ))
        }
    }

    #[derive(Default)]
    struct StageLog(Mutex<Vec<ProcessingStage>>);

    impl ProgressReporter for Arc<StageLog> {
        fn report_progress(&self, update: ProgressUpdate) {
            self.0.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _timings: &RenderTimings) {}

        fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
    }

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("HTTP".parse::<BackendType>().unwrap(), BackendType::Http);
        assert_eq!("quick".parse::<BackendType>().unwrap(), BackendType::Luminance);
        assert!("onnx".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_builder_clamps_and_validates() {
        let config = ProcessorConfig::builder()
            .max_dimension(1)
            .segmentation_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(config.studio.extractor.max_dimension, 16);
        assert_eq!(config.studio.extractor.timeout_secs, 1);

        let http_without_url = ProcessorConfig::builder().backend_type(BackendType::Http).build();
        assert!(matches!(http_without_url, Err(StudioError::InvalidConfig(_))));

        let http = ProcessorConfig::builder()
            .segmenter_url("http://localhost:5000/segment")
            .build()
            .unwrap();
        assert_eq!(http.backend_type, BackendType::Http);
    }

    #[test]
    fn test_default_factory_builds_all_backends() {
        let factory = DefaultBackendFactory;
        let config = ProcessorConfig::builder()
            .segmenter_url("http://localhost:5000/segment")
            .build()
            .unwrap();
        for backend_type in factory.available_backends() {
            assert!(factory.create_backend(backend_type, &config).is_ok());
        }
    }

    #[tokio::test]
    async fn test_render_local_scene() {
        let processor = processor_with(MockBackend::new());
        let scene = SceneSpec::builder().canvas_size(256).shadow(true).build();
        let export = ExportSpec::builder().target_edge(128).build().unwrap();
        let request = RenderRequest::new(scene, export).with_aspect(AspectRatio::Portrait4x5);

        let output = processor.render(&product_png(), &request).await.unwrap();
        assert!(!output.is_degraded());
        assert_eq!(output.image.format, OutputFormat::Png);
        assert_eq!(output.image.height, 128);
        assert!((i64::from(output.image.width) - 102).abs() <= 1);
        assert!(output.timings.total_ms >= output.timings.encode_ms);
    }

    #[tokio::test]
    async fn test_invalid_export_rejected_before_segmentation() {
        let backend = MockBackend::new();
        let processor = processor_with(backend.clone());
        let export = ExportSpec {
            format: OutputFormat::Jpeg,
            transparent: true,
            ..ExportSpec::default()
        };
        let request = RenderRequest::new(SceneSpec::default(), export);

        let result = processor.render(&product_png(), &request).await;
        assert!(matches!(result, Err(StudioError::Encode(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let processor = processor_with(MockBackend::new());
        let result = processor
            .render(b"definitely not an image", &RenderRequest::default())
            .await;
        assert!(matches!(result, Err(StudioError::Decode(_))));
    }

    #[tokio::test]
    async fn test_generated_scene_without_generator() {
        let processor = processor_with(MockBackend::new());
        let scene = SceneSpec::builder()
            .background(BackgroundKind::Generated(ScenePrompt::parse("marble")))
            .build();
        let request = RenderRequest::new(scene, ExportSpec::default());
        let result = processor.render(&product_png(), &request).await;
        assert!(matches!(result, Err(StudioError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_generated_scene_resized_to_canvas() {
        let generator = Arc::new(FixedScene {
            size: 300,
            calls: AtomicUsize::new(0),
        });
        let processor = processor_with(MockBackend::new())
            .with_generator(generator.clone(), None)
            .unwrap();
        assert!(processor.supports_generation());

        let scene = SceneSpec::builder()
            .canvas_size(200)
            .background(BackgroundKind::Generated(ScenePrompt::custom("on a mossy rock")))
            .build();
        let export = ExportSpec::builder().target_edge(200).build().unwrap();
        let output = processor
            .render(&product_png(), &RenderRequest::new(scene, export))
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!((output.image.width, output.image.height), (200, 200));
    }

    #[tokio::test]
    async fn test_segmentation_failure_still_renders() {
        let processor = processor_with(MockBackend::failing("service down"));
        let export = ExportSpec::builder().target_edge(64).build().unwrap();
        let request = RenderRequest::new(SceneSpec::builder().canvas_size(64).build(), export);
        let output = processor.render(&product_png(), &request).await.unwrap();
        assert!(output.is_degraded());
        assert_eq!(output.image.width, 64);
    }

    #[tokio::test]
    async fn test_remote_background_disabled() {
        let processor = processor_with(MockBackend::new()).without_fetcher();
        let request = RenderRequest::default().with_background_url("https://example.com/bg.png");
        let result = processor.render(&product_png(), &request).await;
        assert!(matches!(result, Err(StudioError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_progress_stages_in_order() {
        let log = Arc::new(StageLog::default());
        let processor =
            processor_with(MockBackend::new()).with_progress_reporter(Box::new(log.clone()));
        let scene = SceneSpec::builder()
            .canvas_size(64)
            .background(BackgroundKind::Flat(Color::BLACK))
            .build();
        let export = ExportSpec::builder().target_edge(64).build().unwrap();
        let request = RenderRequest::new(scene, export).with_aspect(AspectRatio::Square);
        processor.render(&product_png(), &request).await.unwrap();

        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                ProcessingStage::Validation,
                ProcessingStage::ImageLoading,
                ProcessingStage::Extraction,
                ProcessingStage::Composition,
                ProcessingStage::Cropping,
                ProcessingStage::Encoding,
                ProcessingStage::Completed,
            ]
        );
    }
}
