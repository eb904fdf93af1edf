//! OpenAI image edit client
//!
//! Sends the prepared canvas and preserve mask to the `images/edits`
//! endpoint. The response carries either a hosted URL or base64 image data.

use crate::{
    error::{Result, StudioError},
    generation::{EditRequest, EditResponse, GenerativeEditBackend},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use instant::Duration;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;

const STAGE: &str = "generation";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/images/edits";

/// How the API should return the generated image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Hosted image URL, resolved afterwards
    Url,
    /// Inline base64 PNG
    Base64,
}

impl ResponseFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Base64 => "b64_json",
        }
    }
}

#[derive(Debug, Deserialize)]
struct EditsResponse {
    #[serde(default)]
    data: Vec<EditsImage>,
}

#[derive(Debug, Deserialize)]
struct EditsImage {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Generative-edit backend for the OpenAI images API
#[derive(Debug, Clone)]
pub struct OpenAiImageEditBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: Option<String>,
    response_format: ResponseFormat,
}

impl OpenAiImageEditBackend {
    /// # Errors
    /// - Empty API key
    /// - HTTP client construction failure
    pub fn new<S: Into<String>>(api_key: S, timeout: Duration) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(StudioError::invalid_config("OpenAI API key is empty"));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StudioError::network_error(STAGE, DEFAULT_ENDPOINT, &e))?;
        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: None,
            response_format: ResponseFormat::Url,
        })
    }

    /// Read the key from `OPENAI_API_KEY`
    ///
    /// # Errors
    /// - Variable unset or empty
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            StudioError::invalid_config("OPENAI_API_KEY is not set; generated scenes need it")
        })?;
        Self::new(key, timeout)
    }

    /// Point at a compatible endpoint (proxies, test servers)
    #[must_use]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    fn file_part(bytes: Vec<u8>, name: &'static str) -> Result<Part> {
        Part::bytes(bytes)
            .file_name(name)
            .mime_str("image/png")
            .map_err(|e| StudioError::generation(format!("Cannot build {} upload: {}", name, e)))
    }

    /// Map a response body onto [`EditResponse`]
    fn parse_body(body: &str) -> Result<EditResponse> {
        let parsed: EditsResponse = serde_json::from_str(body).map_err(|e| {
            StudioError::generation(format!("Malformed image edit response: {}", e))
        })?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::generation("Image edit response contained no images"))?;

        if let Some(encoded) = image.b64_json {
            let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                StudioError::generation(format!("Invalid base64 image data: {}", e))
            })?;
            return Ok(EditResponse::Inline(bytes));
        }
        image
            .url
            .filter(|url| !url.is_empty())
            .map(EditResponse::Reference)
            .ok_or_else(|| StudioError::generation("Image edit response had neither url nor b64_json"))
    }

    fn error_message(body: &str) -> String {
        serde_json::from_str::<ApiErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect())
    }
}

#[async_trait]
impl GenerativeEditBackend for OpenAiImageEditBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn edit(&self, request: EditRequest) -> Result<EditResponse> {
        let mut form = Form::new()
            .part("image", Self::file_part(request.image_png, "image.png")?)
            .part("mask", Self::file_part(request.mask_png, "mask.png")?)
            .text("prompt", request.prompt)
            .text("n", "1")
            .text("size", format!("{0}x{0}", request.size))
            .text("response_format", self.response_format.as_str());
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        log::debug!("Requesting image edit from {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StudioError::network_error(STAGE, &self.endpoint, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StudioError::network_error(STAGE, &self.endpoint, &e))?;
        if !status.is_success() {
            return Err(StudioError::generation(format!(
                "Image edit failed with HTTP {}: {}",
                status,
                Self::error_message(&body)
            )));
        }
        Self::parse_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_response() {
        let body = r#"{"created": 1, "data": [{"url": "https://files.example/scene.png"}]}"#;
        assert_eq!(
            OpenAiImageEditBackend::parse_body(body).unwrap(),
            EditResponse::Reference("https://files.example/scene.png".into())
        );
    }

    #[test]
    fn test_parse_base64_response() {
        let body = format!(r#"{{"data": [{{"b64_json": "{}"}}]}}"#, STANDARD.encode(b"\x89PNG"));
        assert_eq!(
            OpenAiImageEditBackend::parse_body(&body).unwrap(),
            EditResponse::Inline(b"\x89PNG".to_vec())
        );
    }

    #[test]
    fn test_malformed_responses() {
        for body in [
            "not json",
            r#"{"data": []}"#,
            r#"{"data": [{}]}"#,
            r#"{"data": [{"b64_json": "***"}]}"#,
        ] {
            assert!(
                matches!(
                    OpenAiImageEditBackend::parse_body(body),
                    Err(StudioError::Generation(_))
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"message": "Invalid mask", "type": "invalid_request_error"}}"#;
        assert_eq!(OpenAiImageEditBackend::error_message(body), "Invalid mask");
        assert_eq!(OpenAiImageEditBackend::error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = OpenAiImageEditBackend::new("  ", Duration::from_secs(1));
        assert!(matches!(result, Err(StudioError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let backend = OpenAiImageEditBackend::new("sk-test", Duration::from_secs(2))
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/v1/images/edits");
        let request = EditRequest {
            image_png: vec![1, 2, 3],
            mask_png: vec![4, 5, 6],
            prompt: "studio".into(),
            size: 1024,
        };
        let result = backend.edit(request).await;
        assert!(matches!(result, Err(StudioError::Generation(_))));
    }
}
