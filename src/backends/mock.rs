//! Mock segmentation backend for testing and debugging

use crate::{
    error::{Result, StudioError},
    segmentation::{MattingThresholds, SegmentationBackend},
    types::{AlphaMask, RasterBuffer},
};
use async_trait::async_trait;
use instant::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[derive(Debug, Clone)]
enum MockBehavior {
    /// Alpha channel of the input, or fully opaque for RGB input
    SourceAlpha,
    Fixed(AlphaMask),
    Fail(String),
    /// Sleep, then behave like `SourceAlpha`
    Delay(Duration),
}

/// Mock backend that answers without any model or network
///
/// Useful for exercising the pipeline against inputs whose alpha channel
/// already describes the subject, and for forcing capability failures.
#[derive(Debug, Clone)]
pub struct MockBackend {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Return the input's own alpha channel as the segmentation
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::SourceAlpha)
    }

    /// Always return the given mask
    #[must_use]
    pub fn with_mask(mask: AlphaMask) -> Self {
        Self::with_behavior(MockBehavior::Fixed(mask))
    }

    /// Always fail with a segmentation error
    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::with_behavior(MockBehavior::Fail(message.into()))
    }

    /// Respond only after `delay`
    #[must_use]
    pub fn delayed(delay: Duration) -> Self {
        Self::with_behavior(MockBehavior::Delay(delay))
    }

    fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `segment` calls made so far, shared across clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn source_alpha(image: &RasterBuffer) -> AlphaMask {
        if image.has_alpha() {
            AlphaMask::from_rgba(&image.to_rgba8())
        } else {
            AlphaMask::filled(image.width(), image.height(), 255)
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SegmentationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn segment(
        &self,
        image: &RasterBuffer,
        _thresholds: MattingThresholds,
    ) -> Result<AlphaMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            MockBehavior::SourceAlpha => Ok(Self::source_alpha(image)),
            MockBehavior::Fixed(mask) => Ok(mask.clone()),
            MockBehavior::Fail(message) => Err(StudioError::segmentation(message.clone())),
            MockBehavior::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Self::source_alpha(image))
            },
        }
    }
}
