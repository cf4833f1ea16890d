//! Two-tier image cache for remote images.
//!
//! Images are served from a bounded in-memory LRU tier, then from an
//! on-disk tier, and finally downloaded, with concurrent requests for the
//! same locator collapsed into a single fetch.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the cache tiers and adapters.
pub mod infrastructure;
/// Logging setup.
pub mod telemetry;

pub use domain::{CacheError, CacheKey, CacheResult, CachedImage, ImageSubscriber, ImageTransport, KeyCodec};
pub use infrastructure::{CacheConfig, FetchHandle, ImageCache, ImageLoadedEvent, Subscription};

/// Current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
