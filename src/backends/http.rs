//! HTTP segmentation service client
//!
//! Posts the image as a PNG body with the matting thresholds as query
//! parameters. The service answers with an image whose alpha channel is the
//! mask (an RGBA cutout) or a plain grayscale mask.

use crate::{
    error::{Result, StudioError},
    segmentation::{MattingThresholds, SegmentationBackend},
    services::ImageIOService,
    types::{AlphaMask, RasterBuffer},
};
use async_trait::async_trait;
use instant::Duration;
use reqwest::{header, Client};

const STAGE: &str = "segmentation";

/// Client for a remote segmentation service
#[derive(Debug, Clone)]
pub struct HttpSegmentationBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSegmentationBackend {
    /// Create a client for `endpoint`
    ///
    /// The request timeout is set on the client as a second line of defense;
    /// the extractor applies its own timeout around the whole call.
    ///
    /// # Errors
    /// - HTTP client construction failure
    pub fn new<S: Into<String>>(endpoint: S, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StudioError::network_error(STAGE, &endpoint, &e))?;
        Ok(Self {
            client,
            endpoint,
            api_key: None,
        })
    }

    /// Send a bearer token with every request
    #[must_use]
    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Convert the service response into a mask
    fn mask_from_response(bytes: &[u8]) -> Result<AlphaMask> {
        let raster = ImageIOService::decode(bytes).map_err(|e| {
            StudioError::segmentation(format!("Unreadable segmentation response: {}", e))
        })?;

        if raster.has_alpha() {
            Ok(AlphaMask::from_rgba(&raster.to_rgba8()))
        } else {
            Ok(AlphaMask::new(raster.as_dynamic().to_luma8()))
        }
    }
}

#[async_trait]
impl SegmentationBackend for HttpSegmentationBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn segment(&self, image: &RasterBuffer, thresholds: MattingThresholds)
        -> Result<AlphaMask> {
        let body = ImageIOService::to_png_bytes(image)?;
        log::debug!(
            "Posting {}x{} image ({} bytes) to {}",
            image.width(),
            image.height(),
            body.len(),
            self.endpoint
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("alpha_matting", "true".to_string()),
                (
                    "foreground_threshold",
                    thresholds.foreground.to_string(),
                ),
                (
                    "background_threshold",
                    thresholds.background.to_string(),
                ),
            ])
            .header(header::CONTENT_TYPE, "image/png")
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StudioError::network_error(STAGE, &self.endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StudioError::segmentation(format!(
                "Segmentation service returned HTTP {} for '{}'",
                status, self.endpoint
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StudioError::network_error(STAGE, &self.endpoint, &e))?;
        Self::mask_from_response(&bytes)
    }
}
