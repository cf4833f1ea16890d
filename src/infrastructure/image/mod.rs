//! Image caching infrastructure.
//!
//! This module provides:
//! - Memory caching with cost-bounded LRU eviction
//! - Disk caching for persistence
//! - Single-flight fetching through a pluggable transport
//! - The [`ImageCache`] facade tying them together

pub mod decoder;
pub mod disk_cache;
pub mod events;
pub mod fetch_coordinator;
pub mod http_transport;
pub mod image_cache;
pub mod key_codec;
pub mod memory_cache;

pub use decoder::ImageDecoder;
pub use disk_cache::{DiskImageCache, DiskWriter};
pub use events::ImageLoadedEvent;
pub use fetch_coordinator::{FetchCoordinator, FetchHandle};
pub use http_transport::HttpTransport;
pub use image_cache::{ImageCache, Subscription};
pub use key_codec::{HashCodeCodec, Sha256Codec};
pub use memory_cache::{CacheStats, MemoryImageCache};
