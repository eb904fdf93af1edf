//! Remote image retrieval
//!
//! Downloads backgrounds given by URL and resolves the references returned by
//! the generative-edit capability. Resolution is its own collaborator so the
//! generator's contract stays a plain `Result<RasterBuffer>`.

use crate::{
    config::FetchConfig,
    error::{Result, StudioError},
    services::ImageIOService,
    types::RasterBuffer,
};
use async_trait::async_trait;
use instant::Duration;
use reqwest::Client;
use tracing::instrument;

const STAGE: &str = "fetch";

/// Turns a retrievable reference (usually a URL) into encoded image bytes
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// # Errors
    /// - Reference unreachable, non-success status or oversize body
    async fn resolve(&self, reference: &str) -> Result<Vec<u8>>;
}

/// HTTP(S) downloader with a timeout and size cap
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    max_bytes: u64,
}

impl ImageFetcher {
    /// # Errors
    /// - HTTP client construction failure
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StudioError::network_error(STAGE, "client", &e))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }

    /// Download raw bytes from `url`
    ///
    /// # Errors
    /// - Unsupported scheme
    /// - Network failure or timeout
    /// - Non-success HTTP status
    /// - Body larger than the configured cap
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(StudioError::fetch(format!(
                "Unsupported reference '{}': only http and https URLs can be fetched",
                url
            )));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StudioError::network_error(STAGE, url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StudioError::fetch(format!(
                "HTTP {} while downloading '{}'",
                status, url
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(StudioError::fetch(format!(
                    "'{}' is {} bytes, above the {} byte limit",
                    url, length, self.max_bytes
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StudioError::network_error(STAGE, url, &e))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(StudioError::fetch(format!(
                "'{}' exceeded the {} byte limit",
                url, self.max_bytes
            )));
        }

        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }

    /// Download and decode an image
    ///
    /// # Errors
    /// - Any [`ImageFetcher::fetch_bytes`] failure
    /// - Downloaded bytes are not a decodable image (reported as a fetch error)
    pub async fn fetch_image(&self, url: &str) -> Result<RasterBuffer> {
        let bytes = self.fetch_bytes(url).await?;
        ImageIOService::decode(&bytes).map_err(|e| {
            StudioError::fetch(format!("'{}' did not return a usable image: {}", url, e))
        })
    }
}

#[async_trait]
impl ReferenceResolver for ImageFetcher {
    async fn resolve(&self, reference: &str) -> Result<Vec<u8>> {
        self.fetch_bytes(reference).await
    }
}
