//! Backend factory for the CLI
//!
//! Adds environment-driven credentials on top of the library's
//! [`DefaultBackendFactory`] and builds the generative-edit client.

use crate::{
    backends::{OpenAiImageEditBackend, ResponseFormat},
    error::Result,
    generation::GenerativeEditBackend,
    processor::{BackendFactory, BackendType, DefaultBackendFactory, ProcessorConfig},
    segmentation::SegmentationBackend,
};
use instant::Duration;
use std::sync::Arc;

/// Environment variable holding the segmentation service token
pub(crate) const SEGMENTER_KEY_VAR: &str = "IMGLY_SEGMENTER_KEY";

#[derive(Debug, Default)]
pub(crate) struct CliBackendFactory;

impl BackendFactory for CliBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        config: &ProcessorConfig,
    ) -> Result<Arc<dyn SegmentationBackend>> {
        if backend_type == BackendType::Http && config.segmenter_api_key.is_none() {
            if let Ok(key) = std::env::var(SEGMENTER_KEY_VAR) {
                let mut config = config.clone();
                config.segmenter_api_key = Some(key);
                return DefaultBackendFactory.create_backend(backend_type, &config);
            }
        }
        DefaultBackendFactory.create_backend(backend_type, config)
    }

    fn available_backends(&self) -> Vec<BackendType> {
        DefaultBackendFactory.available_backends()
    }
}

impl CliBackendFactory {
    pub(crate) fn new() -> Self {
        Self
    }

    /// OpenAI image edit client keyed from `OPENAI_API_KEY`
    pub(crate) fn create_generator(
        &self,
        config: &ProcessorConfig,
        model: Option<&str>,
    ) -> Result<Arc<dyn GenerativeEditBackend>> {
        let timeout = Duration::from_secs(config.studio.generator.timeout_secs);
        let mut backend =
            OpenAiImageEditBackend::from_env(timeout)?.with_response_format(ResponseFormat::Base64);
        if let Some(model) = model {
            backend = backend.with_model(model);
        }
        Ok(Arc::new(backend))
    }
}
