//! Segmentation capability abstraction
//!
//! The model that separates subject from background lives outside this crate.
//! Backends adapt a concrete service (or a local heuristic) to
//! [`SegmentationBackend`], and the extractor only ever talks to the trait.

use crate::{
    config::ExtractorConfig,
    error::Result,
    types::{AlphaMask, RasterBuffer},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Alpha-matting confidence cutoffs sent with each segmentation request
///
/// Pixels the model scores at or above `foreground` are definite subject,
/// at or below `background` definite backdrop; the band in between is the
/// uncertain region the matting step smooths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MattingThresholds {
    pub foreground: u8,
    pub background: u8,
}

impl Default for MattingThresholds {
    fn default() -> Self {
        Self {
            foreground: 240,
            background: 10,
        }
    }
}

impl From<&ExtractorConfig> for MattingThresholds {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            foreground: config.foreground_threshold,
            background: config.background_threshold,
        }
    }
}

/// External segmentation capability
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Produce a foreground opacity mask for `image`
    ///
    /// The mask may come back at a different resolution than the input;
    /// callers resize it before use.
    ///
    /// # Errors
    /// - Service unreachable, timed out or answering with an error status
    /// - Response that cannot be decoded into a mask
    async fn segment(&self, image: &RasterBuffer, thresholds: MattingThresholds)
        -> Result<AlphaMask>;
}
