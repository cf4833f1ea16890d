//! Single-flight image fetching.
//!
//! Every locator has at most one fetch in flight. Later requesters join the
//! running fetch and observe the same result. A fetch body runs on the
//! runtime, never on the caller, in this order:
//!
//! 1. memory tier (a previous fetch may have just finished)
//! 2. disk tier, decoded on the blocking pool
//! 3. network, streamed into the disk tier and a buffer at the same time,
//!    then decoded from the persisted file or, failing that, the buffer
//!
//! Failures never escape: they are logged and the fetch yields `None`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, Shared};
use futures_util::{FutureExt, StreamExt};
use image::DynamicImage;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, trace, warn};

use crate::domain::entities::{CachedImage, ImageSource};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::ImageTransport;

use super::decoder::ImageDecoder;
use super::disk_cache::DiskImageCache;
use super::memory_cache::MemoryImageCache;

type SharedFetch = Shared<BoxFuture<'static, Option<Arc<CachedImage>>>>;

struct PendingFetch {
    id: u64,
    result: SharedFetch,
    abort: Option<AbortHandle>,
}

/// Orchestrates image loading from memory, disk, and network.
pub struct FetchCoordinator {
    inner: Arc<CoordinatorInner>,
    runtime: Handle,
}

struct CoordinatorInner {
    memory: Arc<MemoryImageCache>,
    disk: Arc<DiskImageCache>,
    transport: Arc<dyn ImageTransport>,
    decoder: ImageDecoder,
    pending: Mutex<HashMap<String, PendingFetch>>,
    next_id: AtomicU64,
    permits: Semaphore,
}

impl FetchCoordinator {
    /// Creates a coordinator spawning fetch bodies on `runtime`, with at
    /// most `max_concurrent_fetches` running at once.
    pub fn new(
        memory: Arc<MemoryImageCache>,
        disk: Arc<DiskImageCache>,
        transport: Arc<dyn ImageTransport>,
        decoder: ImageDecoder,
        max_concurrent_fetches: usize,
        runtime: Handle,
    ) -> Self {
        let inner = CoordinatorInner {
            memory,
            disk,
            transport,
            decoder,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            permits: Semaphore::new(max_concurrent_fetches.max(1)),
        };
        Self {
            inner: Arc::new(inner),
            runtime,
        }
    }

    /// Starts a fetch for `locator`, or joins the one already in flight.
    pub fn request(&self, locator: &str) -> FetchHandle {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = {
            let mut pending = self.inner.pending.lock();
            if let Some(existing) = pending.get(locator) {
                trace!(locator = %locator, "Joining in-flight fetch");
                return FetchHandle::new(locator, existing.result.clone());
            }
            let result = rx.map(Result::unwrap_or_default).boxed().shared();
            pending.insert(
                locator.to_string(),
                PendingFetch {
                    id,
                    result: result.clone(),
                    abort: None,
                },
            );
            FetchHandle::new(locator, result)
        };

        // Spawned outside the lock: the guard may be dropped synchronously
        // if the runtime is shutting down.
        let guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            locator: locator.to_string(),
            id,
        };
        let task = self.runtime.spawn(async move {
            let image = AssertUnwindSafe(guard.inner.run(&guard.locator))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(locator = %guard.locator, "Fetch task panicked");
                    None
                });
            let _ = tx.send(image);
            drop(guard);
        });

        if let Some(fetch) = self.inner.pending.lock().get_mut(locator)
            && fetch.id == id
        {
            fetch.abort = Some(task.abort_handle());
        }
        debug!(locator = %locator, "Started fetch");
        handle
    }

    /// Starts fetches for several locators without waiting for them.
    pub fn prefetch<I, S>(&self, locators: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for locator in locators {
            drop(self.request(locator.as_ref()));
        }
    }

    /// Aborts the fetch in flight for `locator`. Joined waiters get `None`.
    pub fn cancel(&self, locator: &str) {
        let abort = self
            .inner
            .pending
            .lock()
            .get(locator)
            .and_then(|fetch| fetch.abort.clone());
        if let Some(abort) = abort {
            abort.abort();
            debug!(locator = %locator, "Cancelled image fetch");
        }
    }

    /// Aborts every fetch in flight.
    pub fn cancel_all(&self) {
        let aborts: Vec<AbortHandle> = self
            .inner
            .pending
            .lock()
            .values()
            .filter_map(|fetch| fetch.abort.clone())
            .collect();
        for abort in &aborts {
            abort.abort();
        }
        if !aborts.is_empty() {
            debug!(count = aborts.len(), "Cancelled all pending image fetches");
        }
    }

    /// Returns true if a fetch for `locator` is in flight.
    #[must_use]
    pub fn is_loading(&self, locator: &str) -> bool {
        self.inner.pending.lock().contains_key(locator)
    }

    /// Returns the number of fetches in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

/// Removes the pending entry once the fetch task is gone, including when
/// it is aborted before its first poll.
struct PendingGuard {
    inner: Arc<CoordinatorInner>,
    locator: String,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.inner.pending.lock();
        if pending.get(&self.locator).is_some_and(|fetch| fetch.id == self.id) {
            pending.remove(&self.locator);
        }
    }
}

impl CoordinatorInner {
    async fn run(&self, locator: &str) -> Option<Arc<CachedImage>> {
        if let Some(img) = self.memory.peek(locator) {
            trace!(locator = %locator, source = %ImageSource::MemoryCache, "Image already cached");
            return Some(img);
        }

        let Ok(_permit) = self.permits.acquire().await else {
            return None;
        };

        match self.fetch(locator).await {
            Ok((decoded, source)) => {
                let img = Arc::new(CachedImage::new(decoded));
                self.memory.put(locator, Arc::clone(&img));
                debug!(locator = %locator, source = %source, "Image loaded successfully");
                Some(img)
            }
            Err(CacheError::OutOfMemory(msg)) => {
                warn!(locator = %locator, error = %msg, "Out of memory while decoding, clearing memory cache");
                self.memory.evict_all();
                None
            }
            Err(e) => {
                warn!(locator = %locator, error = %e, "Image fetch failed");
                None
            }
        }
    }

    async fn fetch(&self, locator: &str) -> CacheResult<(DynamicImage, ImageSource)> {
        if let Some(bytes) = self.disk.read(locator).await {
            match self.decode_bytes(bytes).await {
                Ok(img) => return Ok((img, ImageSource::DiskCache)),
                Err(e @ CacheError::OutOfMemory(_)) => return Err(e),
                Err(e) => {
                    debug!(locator = %locator, error = %e, "Cached file unusable, refetching");
                }
            }
        }

        let (buffer, persisted) = self.download(locator).await?;

        if let Some(path) = persisted {
            match self.decode_file(path).await {
                Ok(img) => return Ok((img, ImageSource::Network)),
                Err(e @ CacheError::OutOfMemory(_)) => return Err(e),
                Err(e) => {
                    debug!(locator = %locator, error = %e, "Decoding persisted file failed, using response buffer");
                }
            }
        }

        let img = self.decode_bytes(buffer).await?;
        Ok((img, ImageSource::Network))
    }

    /// Streams the body into memory and, when possible, into the disk tier.
    /// Returns the buffered body and the path of the committed file.
    async fn download(&self, locator: &str) -> CacheResult<(Vec<u8>, Option<PathBuf>)> {
        let mut body = self.transport.open(locator).await?;
        let mut writer = self.disk.create_writer(locator).await;
        let mut buffer = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let failed = match writer.as_mut() {
                Some(w) => w.write_chunk(&chunk).await.err(),
                None => None,
            };
            if let Some(e) = failed {
                warn!(locator = %locator, error = %e, "Failed to cache to disk");
                writer = None;
            }
            buffer.extend_from_slice(&chunk);
        }
        drop(body);

        let persisted = match writer {
            Some(w) => match w.commit().await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(locator = %locator, error = %e, "Failed to cache to disk");
                    None
                }
            },
            None => None,
        };

        Ok((buffer, persisted))
    }

    async fn decode_bytes(&self, bytes: Vec<u8>) -> CacheResult<DynamicImage> {
        let decoder = self.decoder.clone();
        tokio::task::spawn_blocking(move || decoder.decode_bytes(&bytes))
            .await
            .map_err(|e| CacheError::Decode(format!("Decode task panicked: {e}")))?
    }

    async fn decode_file(&self, path: PathBuf) -> CacheResult<DynamicImage> {
        let decoder = self.decoder.clone();
        tokio::task::spawn_blocking(move || decoder.decode_file(&path))
            .await
            .map_err(|e| CacheError::Decode(format!("Decode task panicked: {e}")))?
    }
}

/// Pending result of a load.
///
/// Resolves to the decoded image, or `None` if it could not be loaded.
/// Dropping the handle (or calling [`FetchHandle::cancel`]) withdraws this
/// waiter only; the fetch keeps running and its result is still cached.
#[must_use = "a FetchHandle does nothing unless awaited"]
pub struct FetchHandle {
    locator: String,
    result: SharedFetch,
}

impl FetchHandle {
    fn new(locator: &str, result: SharedFetch) -> Self {
        Self {
            locator: locator.to_string(),
            result,
        }
    }

    /// A handle that is already resolved.
    pub fn ready(locator: &str, image: Option<Arc<CachedImage>>) -> Self {
        Self::new(locator, futures_util::future::ready(image).boxed().shared())
    }

    /// Locator this handle waits for.
    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Withdraws interest in the result.
    pub fn cancel(self) {
        trace!(locator = %self.locator, "Waiter withdrew");
    }
}

impl Future for FetchHandle {
    type Output = Option<Arc<CachedImage>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result).poll(cx)
    }
}

impl std::fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle")
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}
