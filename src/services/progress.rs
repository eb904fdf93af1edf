//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so frontends (CLI spinner,
//! log output, an embedding web service) can each handle it their own way.

use crate::types::RenderTimings;
use instant::Instant;

/// Stages of a studio render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Checking export and scene parameters
    Validation,
    /// Decoding the uploaded image
    ImageLoading,
    /// Segmentation call and mask refinement
    Extraction,
    /// Local scene composition
    Composition,
    /// Waiting on the generative-edit capability
    Generation,
    /// Downloading a referenced background
    BackgroundFetch,
    /// Aspect-ratio crop
    Cropping,
    /// Rescale and encode
    Encoding,
    /// Render finished
    Completed,
}

impl ProcessingStage {
    /// Human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Validation => "Validating render settings",
            ProcessingStage::ImageLoading => "Loading input image",
            ProcessingStage::Extraction => "Extracting product",
            ProcessingStage::Composition => "Composing scene",
            ProcessingStage::Generation => "Generating scene",
            ProcessingStage::BackgroundFetch => "Fetching background",
            ProcessingStage::Cropping => "Cropping to aspect ratio",
            ProcessingStage::Encoding => "Encoding output",
            ProcessingStage::Completed => "Render completed",
        }
    }

    /// Typical progress percentage at the start of this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Validation => 2,
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::Extraction => 15,
            ProcessingStage::BackgroundFetch => 45,
            ProcessingStage::Composition | ProcessingStage::Generation => 55,
            ProcessingStage::Cropping => 85,
            ProcessingStage::Encoding => 90,
            ProcessingStage::Completed => 100,
        }
    }

    /// Whether the stage waits on a network collaborator
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ProcessingStage::Extraction | ProcessingStage::Generation | ProcessingStage::BackgroundFetch
        )
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the render started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Receives progress during a render
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    fn report_completion(&self, timings: &RenderTimings);

    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &RenderTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Emits progress as log and tracing events
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        tracing::debug!(
            stage = ?update.stage,
            progress = update.progress,
            elapsed_ms = update.elapsed_ms,
            "render progress"
        );
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &RenderTimings) {
        log::info!("✅ Render completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Decode: {}ms", timings.decode_ms);
            log::info!("    • Extraction: {}ms", timings.extraction_ms);
            log::info!("    • Composition: {}ms", timings.composition_ms);
            log::info!("    • Crop: {}ms", timings.crop_ms);
            log::info!("    • Encode: {}ms", timings.encode_ms);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}
