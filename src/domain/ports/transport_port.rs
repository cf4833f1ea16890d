//! Port for downloading raw image bytes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::errors::CacheResult;

/// Response body as a stream of chunks.
pub type ByteStream = BoxStream<'static, CacheResult<Bytes>>;

/// Port for fetching the encoded bytes behind a locator.
///
/// The returned stream owns the underlying connection; dropping it releases
/// the connection.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Opens a GET request and returns the response body.
    async fn open(&self, locator: &str) -> CacheResult<ByteStream>;
}
