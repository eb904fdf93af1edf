//! Studio CLI
//!
//! Renders one product photo into a finished studio shot using the unified
//! processor.

use super::{backend_factory::CliBackendFactory, config::CliConfigBuilder};
use crate::{
    error::StudioError,
    processor::{RenderOutput, StudioProcessor},
    services::{ImageIOService, ProcessingStage, ProgressReporter, ProgressUpdate},
    tracing_config::spans,
    types::RenderTimings,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use instant::Duration;
use log::{info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Product photo studio: extract, stage and export
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "imgly-studio")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file or directory. Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Background: white, black, beige, #rrggbb, gradient:gray|brand|cream|midnight, image:PATH or url:URL
    #[arg(short, long, value_name = "BACKGROUND")]
    pub background: Option<String>,

    /// Generate the scene instead: a preset (marble, wood, concrete, silk, studio, dark-studio) or free text
    #[arg(long, value_name = "PRESET|TEXT")]
    pub scene: Option<String>,

    /// Square canvas edge in pixels [default: 1024]
    #[arg(long)]
    pub canvas: Option<u32>,

    /// Subject's longer side as a percentage of the canvas (40-160)
    #[arg(long, default_value_t = 85)]
    pub scale: u32,

    /// Horizontal subject offset in pixels
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset_x: i32,

    /// Vertical subject offset in pixels
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset_y: i32,

    /// Add a soft contact shadow under the subject
    #[arg(long)]
    pub shadow: bool,

    /// Add a fading floor reflection
    #[arg(long)]
    pub reflection: bool,

    /// Final crop: 1:1, 4:5, 3:4, 9:16, 16:9 or 4:3
    #[arg(long, value_name = "W:H")]
    pub aspect: Option<String>,

    /// Output format [default: from the output extension, else png]
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// Longest edge of the exported image in pixels
    #[arg(long)]
    pub edge: Option<u32>,

    /// JPEG/WebP quality (1-100)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// PNG compression level (0-9)
    #[arg(long)]
    pub compression: Option<u8>,

    /// Print density written into PNG/JPEG metadata
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Export only the subject on a transparent canvas (PNG/WebP)
    #[arg(long)]
    pub transparent: bool,

    /// Color JPEG transparency is flattened onto
    #[arg(long, value_name = "COLOR")]
    pub matte: Option<String>,

    /// Segmentation service URL (enables the HTTP backend)
    #[arg(long, value_name = "URL")]
    pub segmenter: Option<String>,

    /// Segmentation backend: http, luminance or mock
    #[arg(long)]
    pub backend: Option<String>,

    /// Model name passed to the image edit API
    #[arg(long)]
    pub scene_model: Option<String>,

    /// JSON studio configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
}

/// Mirrors pipeline stages onto a terminal spinner
struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        let suffix = if update.stage.is_remote() { " (waiting on service)" } else { "" };
        self.bar
            .set_message(format!("[{}%] {}{}", update.progress, update.description, suffix));
    }

    fn report_completion(&self, timings: &RenderTimings) {
        self.bar
            .finish_with_message(format!("Done in {:.2}s", timings.total_ms as f64 / 1000.0));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("⚠️  {}: {}", stage.description(), error));
        if stage != ProcessingStage::Extraction {
            self.bar.abandon();
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    crate::tracing_config::init_cli_tracing(cli.verbose)
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let request = CliConfigBuilder::request_from_cli(&cli, &config)?;

    info!("Starting studio render");
    info!(
        "Segmentation: {:?}, output: {:?} at {}px",
        config.backend_type, request.export.format, request.export.target_edge
    );

    let factory = CliBackendFactory::new();
    let mut processor = StudioProcessor::with_factory(config.clone(), &factory)
        .context("Failed to create processor")?;
    if request.scene.background.is_generated() {
        let generator = factory
            .create_generator(&config, cli.scene_model.as_deref())
            .context("Generated scenes are unavailable")?;
        processor = processor.with_generator(generator, None)?;
    }
    let processor = processor.with_progress_reporter(Box::new(SpinnerReporter::new()));

    let input_path = PathBuf::from(&cli.input);
    let span = spans::render(&input_path, request.export.format.as_str());

    let rendered = async {
        let bytes = if cli.input == "-" {
            read_stdin()?
        } else {
            tokio::fs::read(&input_path)
                .await
                .with_context(|| format!("Failed to read {}", input_path.display()))?
        };

        match processor.render(&bytes, &request).await {
            Ok(output) => anyhow::Ok(output),
            Err(e @ StudioError::Generation(_)) => Err(e).context(
                "Scene generation failed; re-run with --background to compose locally instead",
            ),
            Err(e) => Err(e).context("Render failed"),
        }
    };
    let output = rendered.instrument(span).await?;

    if let Some(reason) = &output.segmentation_fallback {
        warn!(
            "Segmentation failed ({}); the whole photo was used as the subject",
            reason
        );
    }
    report_timings(&output);

    write_output(&cli, &input_path, &output)
}

fn report_timings(output: &RenderOutput) {
    let t = &output.timings;
    info!(
        "📊 {}x{} {} ({} bytes) in {}ms",
        output.image.width,
        output.image.height,
        output.image.mime_type(),
        output.image.len(),
        t.total_ms
    );
    info!("  ├─ Decode: {}ms", t.decode_ms);
    info!("  ├─ Extraction: {}ms", t.extraction_ms);
    info!("  ├─ Composition: {}ms", t.composition_ms);
    info!("  ├─ Crop: {}ms", t.crop_ms);
    info!("  └─ Encode: {}ms", t.encode_ms);
}

fn write_output(cli: &Cli, input_path: &Path, output: &RenderOutput) -> Result<()> {
    let image = &output.image;
    let stem = input_path
        .file_stem()
        .map_or_else(|| "studio".to_string(), |s| s.to_string_lossy().into_owned());

    let target = match cli.output.as_deref() {
        Some("-") => return write_stdout(&image.bytes),
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_dir() {
                path.join(image.file_name(&stem))
            } else {
                path
            }
        },
        None => input_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(image.file_name(&stem)),
    };

    ImageIOService::write_bytes(&target, &image.bytes)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    info!("✅ Saved {}", target.display());
    Ok(())
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;

    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}
