//! Capability backends
//!
//! This module provides the adapters between the pipeline and its external
//! collaborators:
//! - HTTP segmentation service client
//! - Luminance-threshold segmentation (limited local fallback)
//! - Mock segmentation for tests and offline runs
//! - OpenAI image edit client for generated scenes

pub mod http;
pub mod luminance;
pub mod mock;
pub mod openai;

pub use self::http::HttpSegmentationBackend;
pub use self::luminance::LuminanceBackend;
pub use self::mock::MockBackend;
pub use self::openai::{OpenAiImageEditBackend, ResponseFormat};
