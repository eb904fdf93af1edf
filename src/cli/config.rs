//! Conversion from CLI arguments to processor and render settings

use crate::cli::main_impl::{Cli, CliOutputFormat};
use crate::{
    config::{BackgroundKind, Color, ExportSpec, GradientPreset, OutputFormat, SceneSpec, StudioConfig},
    crop::AspectRatio,
    generation::ScenePrompt,
    processor::{BackendType, ProcessorConfig, ProcessorConfigBuilder, RenderRequest},
    services::ImageIOService,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Background argument after parsing
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BackgroundArg {
    Local(BackgroundKind),
    Remote(String),
}

/// Convert CLI arguments to unified configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build ProcessorConfig from CLI arguments and the optional config file
    pub(crate) fn from_cli(cli: &Cli) -> Result<ProcessorConfig> {
        let studio = match &cli.config {
            Some(path) => StudioConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => StudioConfig::default(),
        };

        let mut builder = ProcessorConfigBuilder::new()
            .studio_config(studio)
            .verbose_progress(cli.verbose > 0);

        builder = match (&cli.segmenter, &cli.backend) {
            (Some(url), _) => builder.segmenter_url(url.clone()),
            (None, Some(name)) => {
                let backend_type: BackendType = name.parse().context("Invalid --backend")?;
                builder.backend_type(backend_type)
            },
            (None, None) => builder.backend_type(BackendType::Luminance),
        };

        builder.build().context("Invalid configuration")
    }

    /// Build the render request from scene and export flags
    pub(crate) fn request_from_cli(cli: &Cli, config: &ProcessorConfig) -> Result<RenderRequest> {
        let background = match (&cli.scene, &cli.background) {
            (Some(scene), _) => BackgroundArg::Local(BackgroundKind::Generated(ScenePrompt::parse(scene))),
            (None, Some(arg)) => Self::parse_background(arg)?,
            (None, None) => BackgroundArg::Local(BackgroundKind::default()),
        };

        let mut scene_builder = SceneSpec::builder()
            .scale_percent(cli.scale)
            .offset(cli.offset_x, cli.offset_y)
            .shadow(cli.shadow)
            .reflection(cli.reflection);
        if let Some(canvas) = cli.canvas {
            scene_builder = scene_builder.canvas_size(canvas);
        }

        let (scene, background_url) = match background {
            BackgroundArg::Local(kind) => (scene_builder.background(kind).build(), None),
            BackgroundArg::Remote(url) => (scene_builder.build(), Some(url)),
        };

        let mut request = RenderRequest::new(scene, Self::export_from_cli(cli, &config.studio.export)?);
        request.background_url = background_url;
        if let Some(aspect) = &cli.aspect {
            request.aspect = Some(aspect.parse::<AspectRatio>().context("Invalid --aspect")?);
        }
        Ok(request)
    }

    /// Export parameters: config file defaults overridden by flags
    pub(crate) fn export_from_cli(cli: &Cli, defaults: &ExportSpec) -> Result<ExportSpec> {
        let mut export = defaults.clone();
        export.format = match cli.format {
            Some(format) => format.into(),
            None => cli
                .output
                .as_deref()
                .and_then(|output| Self::format_from_path(Path::new(output)))
                .unwrap_or(defaults.format),
        };
        if let Some(edge) = cli.edge {
            export.target_edge = edge;
        }
        if let Some(quality) = cli.quality {
            export.quality = quality;
        }
        if let Some(compression) = cli.compression {
            export.compression = compression;
        }
        if let Some(dpi) = cli.dpi {
            export.dpi = dpi;
        }
        if let Some(matte) = &cli.matte {
            export.matte = matte.parse::<Color>().context("Invalid --matte")?;
        }
        export.transparent = cli.transparent || defaults.transparent;
        Ok(export)
    }

    /// Parse `white`, `#rrggbb`, `gradient:NAME`, `image:PATH` or `url:URL`
    pub(crate) fn parse_background(arg: &str) -> Result<BackgroundArg> {
        if let Some(preset) = arg.strip_prefix("gradient:") {
            let preset: GradientPreset = preset.parse().context("Invalid gradient")?;
            return Ok(BackgroundArg::Local(BackgroundKind::Gradient(preset.stops())));
        }
        if let Some(path) = arg.strip_prefix("image:") {
            let raster = ImageIOService::load_image(path)
                .with_context(|| format!("Failed to load background image {}", path))?;
            return Ok(BackgroundArg::Local(BackgroundKind::External(raster)));
        }
        if let Some(url) = arg.strip_prefix("url:") {
            return Ok(BackgroundArg::Remote(url.to_string()));
        }
        if arg.starts_with("http://") || arg.starts_with("https://") {
            return Ok(BackgroundArg::Remote(arg.to_string()));
        }
        let color: Color = arg.parse().context("Invalid background color")?;
        Ok(BackgroundArg::Local(BackgroundKind::Flat(color)))
    }

    fn format_from_path(path: &Path) -> Option<OutputFormat> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.segmenter.is_some() && cli.backend.is_some() {
            anyhow::bail!("--segmenter and --backend cannot be combined");
        }
        if cli.scene.is_some() && cli.background.is_some() {
            anyhow::bail!("--scene generates its own background; drop --background");
        }
        if cli.input == "-" && cli.output.is_none() {
            anyhow::bail!("Reading from stdin needs an explicit --output (use - for stdout)");
        }
        Ok(())
    }
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["imgly-studio"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_conversion() {
        let cli = parse(&["shoe.jpg", "-o", "out.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.backend_type, BackendType::Luminance);

        let request = CliConfigBuilder::request_from_cli(&cli, &config).unwrap();
        assert_eq!(request.scene.background, BackgroundKind::Flat(Color::WHITE));
        assert_eq!(request.export.format, OutputFormat::Png);
        assert!(request.aspect.is_none());
    }

    #[test]
    fn test_flags_override_export_defaults() {
        let cli = parse(&[
            "shoe.jpg", "-o", "out.jpg", "--edge", "2048", "--quality", "80", "--dpi", "72",
            "--aspect", "4:5",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        let request = CliConfigBuilder::request_from_cli(&cli, &config).unwrap();

        assert_eq!(request.export.format, OutputFormat::Jpeg);
        assert_eq!(request.export.target_edge, 2048);
        assert_eq!(request.export.quality, 80);
        assert_eq!(request.export.dpi, 72);
        assert_eq!(request.aspect, Some(AspectRatio::Portrait4x5));
    }

    #[test]
    fn test_background_arguments() {
        assert_eq!(
            CliConfigBuilder::parse_background("#102030").unwrap(),
            BackgroundArg::Local(BackgroundKind::Flat(Color::new(16, 32, 48)))
        );
        assert_eq!(
            CliConfigBuilder::parse_background("gradient:brand").unwrap(),
            BackgroundArg::Local(BackgroundKind::Gradient(GradientPreset::Brand.stops()))
        );
        assert_eq!(
            CliConfigBuilder::parse_background("url:https://cdn.example/bg.jpg").unwrap(),
            BackgroundArg::Remote("https://cdn.example/bg.jpg".into())
        );
        assert!(CliConfigBuilder::parse_background("chartreuse-ish").is_err());
        assert!(CliConfigBuilder::parse_background("image:/does/not/exist.png").is_err());
    }

    #[test]
    fn test_scene_selects_generation() {
        let cli = parse(&["shoe.jpg", "-o", "out.png", "--scene", "marble"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        let request = CliConfigBuilder::request_from_cli(&cli, &config).unwrap();
        assert!(request.scene.background.is_generated());
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&["shoe.jpg"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["-"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&[
            "shoe.jpg", "--scene", "wood", "--background", "black"
        ]))
        .is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&[
            "shoe.jpg", "--segmenter", "http://localhost:1/seg", "--backend", "mock"
        ]))
        .is_err());
    }

    #[test]
    fn test_segmenter_url_selects_http() {
        let cli = parse(&["shoe.jpg", "--segmenter", "http://localhost:7000/segment"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.backend_type, BackendType::Http);
        assert_eq!(config.segmenter_url.as_deref(), Some("http://localhost:7000/segment"));
    }
}
