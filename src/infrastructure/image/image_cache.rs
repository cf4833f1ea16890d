//! Public entry point composing both cache tiers and the fetcher.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::domain::entities::CachedImage;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ImageSubscriber, ImageTransport};
use crate::infrastructure::config::CacheConfig;

use super::decoder::ImageDecoder;
use super::disk_cache::DiskImageCache;
use super::fetch_coordinator::{FetchCoordinator, FetchHandle};
use super::http_transport::HttpTransport;
use super::memory_cache::{CacheStats, MemoryImageCache};

/// Two-tier image cache: a bounded memory tier in front of an optional
/// disk tier, filled from the network on demand.
///
/// Construct one per application and hand it to consumers; it is meant to
/// be shared behind an `Arc`.
pub struct ImageCache {
    config: CacheConfig,
    memory: Arc<MemoryImageCache>,
    disk: Arc<DiskImageCache>,
    coordinator: FetchCoordinator,
    runtime: Handle,
}

impl ImageCache {
    /// Opens a cache that downloads over HTTP.
    ///
    /// Must be called from within a tokio runtime; fetches are spawned on it.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created. An unusable disk
    /// directory is not an error: the disk tier is disabled instead.
    pub async fn open(config: CacheConfig) -> CacheResult<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Ok(Self::with_transport(config, transport).await)
    }

    /// Opens a cache with the given disk directory and memory capacity,
    /// everything else at defaults. A capacity of zero selects the default.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub async fn configure(
        directory: Option<PathBuf>,
        memory_capacity_bytes: usize,
    ) -> CacheResult<Self> {
        let config = CacheConfig {
            cache_dir: directory,
            memory_capacity_bytes,
            ..CacheConfig::default()
        };
        Self::open(config).await
    }

    /// Opens a cache that downloads through `transport`.
    pub async fn with_transport(config: CacheConfig, transport: Arc<dyn ImageTransport>) -> Self {
        let memory = Arc::new(MemoryImageCache::new(config.effective_memory_capacity()));
        let disk = Arc::new(DiskImageCache::open(config.cache_dir.clone(), config.key_scheme.codec()).await);
        let runtime = Handle::current();
        let coordinator = FetchCoordinator::new(
            Arc::clone(&memory),
            Arc::clone(&disk),
            transport,
            ImageDecoder::new(config.max_decode_bytes),
            config.max_concurrent_fetches,
            runtime.clone(),
        );

        info!(
            capacity = memory.capacity(),
            disk_enabled = disk.is_enabled(),
            key_scheme = ?config.key_scheme,
            "Image cache ready"
        );

        Self {
            config,
            memory,
            disk,
            coordinator,
            runtime,
        }
    }

    /// Memory-only lookup. Never blocks on IO.
    pub fn get(&self, locator: &str) -> Option<Arc<CachedImage>> {
        self.memory.get(locator)
    }

    /// Stores an already decoded image in the memory tier.
    pub fn put(&self, locator: &str, image: Arc<CachedImage>) {
        self.memory.put(locator, image);
    }

    /// Loads an image through memory, disk and network.
    ///
    /// A memory hit yields an already resolved handle. Otherwise the handle
    /// joins the fetch in flight for this locator, starting one if needed.
    ///
    /// # Errors
    /// Returns `CacheError::EmptyLocator` if `locator` is empty.
    pub fn load(&self, locator: &str) -> CacheResult<FetchHandle> {
        if locator.is_empty() {
            return Err(CacheError::EmptyLocator);
        }
        if let Some(img) = self.memory.get(locator) {
            return Ok(FetchHandle::ready(locator, Some(img)));
        }
        Ok(self.coordinator.request(locator))
    }

    /// Loads an image and hands the result to `subscriber`, if it is still
    /// interested by then.
    ///
    /// # Errors
    /// Returns `CacheError::EmptyLocator` if `locator` is empty.
    pub fn subscribe(
        &self,
        locator: &str,
        subscriber: Arc<dyn ImageSubscriber>,
    ) -> CacheResult<Subscription> {
        let handle = self.load(locator)?;
        let owned = locator.to_string();
        let task = self.runtime.spawn(async move {
            let image = handle.await;
            if subscriber.is_still_interested() {
                subscriber.on_result(&owned, image);
                true
            } else {
                trace!(locator = %owned, "Subscriber lost interest, result dropped");
                false
            }
        });
        Ok(Subscription {
            locator: locator.to_string(),
            task,
        })
    }

    /// Starts loading several images in the background.
    pub fn prefetch<I, S>(&self, locators: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let missing: Vec<S> = locators
            .into_iter()
            .filter(|l| !l.as_ref().is_empty() && self.memory.peek(l.as_ref()).is_none())
            .collect();
        self.coordinator.prefetch(missing);
    }

    /// Drops every image from the memory tier.
    pub fn invalidate_memory(&self) {
        self.memory.evict_all();
    }

    /// Deletes every file in the disk tier.
    pub async fn invalidate_disk(&self) {
        self.disk.clear().await;
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.invalidate_memory();
        self.invalidate_disk().await;
        info!("Cleared all image caches");
    }

    /// Replaces the memory tier with an empty one of the new capacity.
    /// Zero selects the default capacity.
    pub fn resize_memory(&self, capacity: usize) {
        self.memory.resize(capacity);
    }

    /// Bytes used by the disk tier, 0 when it is disabled.
    pub async fn disk_usage_bytes(&self) -> u64 {
        self.disk.size_bytes().await
    }

    /// Returns true if the disk tier is in use.
    #[must_use]
    pub fn is_disk_cache_enabled(&self) -> bool {
        self.disk.is_enabled()
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Aborts one fetch in flight; its waiters get `None`.
    pub fn cancel(&self, locator: &str) {
        self.coordinator.cancel(locator);
    }

    /// Aborts every fetch in flight.
    pub fn cancel_all(&self) {
        self.coordinator.cancel_all();
    }

    /// Returns true if an image is currently loading.
    #[must_use]
    pub fn is_loading(&self, locator: &str) -> bool {
        self.coordinator.is_loading(locator)
    }

    /// Returns the number of fetches in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.coordinator.pending_count()
    }

    /// Returns the configuration the cache was opened with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory", &self.memory)
            .field("disk", &self.disk)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

/// A pending delivery to an [`ImageSubscriber`].
///
/// Dropping it leaves the delivery in place; call
/// [`Subscription::unsubscribe`] to withdraw.
#[derive(Debug)]
pub struct Subscription {
    locator: String,
    task: JoinHandle<bool>,
}

impl Subscription {
    /// Locator this subscription waits for.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Withdraws interest. The underlying fetch keeps running and its
    /// result is still cached.
    pub fn unsubscribe(self) {
        self.task.abort();
        debug!(locator = %self.locator, "Unsubscribed");
    }

    /// Returns true once the delivery has happened or been skipped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the delivery. Returns true if the subscriber was called.
    pub async fn delivered(self) -> bool {
        self.task.await.unwrap_or(false)
    }
}
