//! HTTP transport backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ByteStream, ImageTransport};
use crate::infrastructure::config::CacheConfig;

/// Plain GET requests with bounded connect and read timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport with the given timeouts and User-Agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(connect_timeout: Duration, read_timeout: Duration, user_agent: &str) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CacheError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Builds a transport from cache configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        Self::new(config.connect_timeout(), config.read_timeout(), &config.user_agent)
    }
}

#[async_trait]
impl ImageTransport for HttpTransport {
    async fn open(&self, locator: &str) -> CacheResult<ByteStream> {
        let url = reqwest::Url::parse(locator)
            .map_err(|e| CacheError::InvalidLocator(format!("{locator}: {e}")))?;

        debug!(url = %url, "Downloading image from network");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CacheError::Network(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CacheError::Network(format!("Failed to read body: {e}"))))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        let transport = HttpTransport::from_config(&CacheConfig::default());
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_locator() {
        let transport = HttpTransport::from_config(&CacheConfig::default()).unwrap();
        let result = transport.open("not a url").await;
        assert!(matches!(result, Err(CacheError::InvalidLocator(_))));
    }
}
