//! Port for deriving disk cache keys from locators.

use crate::domain::entities::CacheKey;

/// Maps a locator to the name of its disk cache file.
///
/// Implementations must be pure, total and stable across process restarts:
/// no salting, no randomness.
pub trait KeyCodec: Send + Sync + std::fmt::Debug {
    /// Returns the cache key for the given locator.
    fn key_for(&self, locator: &str) -> CacheKey;
}
