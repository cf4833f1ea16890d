//! Errors raised while fetching, persisting or decoding images.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
///
/// Apart from [`CacheError::EmptyLocator`] and HTTP client construction,
/// these never cross the public surface: the fetch path logs them and
/// reports an absent image.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The locator is not a usable URL.
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    /// A request was made without a locator.
    #[error("no locator given")]
    EmptyLocator,
    /// Connection, timeout or HTTP status failure.
    #[error("network error: {0}")]
    Network(String),
    /// I/O error during a disk operation.
    #[error("io error: {0}")]
    Io(String),
    /// The bytes could not be decoded as an image.
    #[error("decode error: {0}")]
    Decode(String),
    /// Decoding needed more memory than allowed.
    #[error("out of memory while decoding: {0}")]
    OutOfMemory(String),
}

impl CacheError {
    /// Returns true for decode-time memory exhaustion.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}
