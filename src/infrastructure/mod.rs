//! Infrastructure layer with adapters for disk, network and decoding.

/// Cache configuration.
pub mod config;
/// Image caching (memory, disk, fetching).
pub mod image;

pub use config::{CacheConfig, ConfigError, DEFAULT_MEMORY_CAPACITY, KeyScheme, LogLevel};
pub use image::{
    CacheStats, DiskImageCache, FetchHandle, HttpTransport, ImageCache, ImageLoadedEvent,
    MemoryImageCache, Subscription,
};
