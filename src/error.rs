//! Error types for studio compositing operations

use thiserror::Error;

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

/// Error taxonomy for the compositing and export pipeline
///
/// Every pipeline failure maps to one variant so callers can choose a
/// per-kind reaction (retry, fall back to a local scene, abort).
#[derive(Error, Debug)]
pub enum StudioError {
    /// Input bytes are not a valid or supported raster
    #[error("Decode error: {0}")]
    Decode(String),

    /// External segmentation capability failed or timed out
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// External generative-edit capability failed, timed out or returned an unusable result
    #[error("Generation error: {0}")]
    Generation(String),

    /// A referenced background or result image could not be downloaded
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Invalid combination of export format, transparency, quality or size
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors raised by the image crate outside of decoding
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`StudioError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Segmentation,
    Generation,
    Fetch,
    Encode,
    InvalidConfig,
    Io,
    Image,
    Internal,
}

impl StudioError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::Segmentation(_) => ErrorKind::Segmentation,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::Encode(_) => ErrorKind::Encode,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
            Self::Image(_) => ErrorKind::Image,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request can reasonably succeed
    ///
    /// Network-bound failures are retryable; decode and encode failures are
    /// deterministic for a given input and are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Segmentation(_) | Self::Generation(_) | Self::Fetch(_)
        )
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create export parameter error with valid ranges
    pub fn export_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::Encode(format!(
            "Invalid export {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create network error with request context
    pub fn network_error(stage: &str, url: &str, error: &reqwest::Error) -> Self {
        let detail = if error.is_timeout() {
            format!("{} timed out requesting '{}'", stage, url)
        } else {
            format!("{} failed requesting '{}': {}", stage, url, error)
        };
        match stage {
            "segmentation" => Self::Segmentation(detail),
            "generation" => Self::Generation(detail),
            _ => Self::Fetch(detail),
        }
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Internal(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = StudioError::invalid_config("test config error");
        assert!(matches!(err, StudioError::InvalidConfig(_)));

        let err = StudioError::encode("transparent JPEG");
        assert_eq!(err.kind(), ErrorKind::Encode);

        let err = StudioError::generation("capability unavailable");
        assert_eq!(err.kind(), ErrorKind::Generation);
    }

    #[test]
    fn test_error_display() {
        let err = StudioError::decode("not an image");
        assert_eq!(err.to_string(), "Decode error: not an image");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(StudioError::segmentation("timeout").is_retryable());
        assert!(StudioError::generation("503").is_retryable());
        assert!(StudioError::fetch("404").is_retryable());
        assert!(!StudioError::decode("garbage").is_retryable());
        assert!(!StudioError::encode("bad quality").is_retryable());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = StudioError::file_io_error("write export", Path::new("/out/a.png"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write export"));
        assert!(error_string.contains("/out/a.png"));

        let err = StudioError::config_value_error("scale_percent", 300, "40-160", Some(85));
        let error_string = err.to_string();
        assert!(error_string.contains("scale_percent"));
        assert!(error_string.contains("40-160"));
        assert!(error_string.contains("Recommended: 85"));

        let err = StudioError::export_value_error("quality", 0, "1-100");
        assert_eq!(err.kind(), ErrorKind::Encode);
        assert!(err.to_string().contains("quality"));

        let err = StudioError::processing_stage_error("compose", "empty canvas", Some("0x0"));
        let error_string = err.to_string();
        assert!(error_string.contains("compose"));
        assert!(error_string.contains("0x0"));
    }
}
