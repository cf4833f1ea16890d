//! Disk-based image cache for persistence across sessions.
//!
//! Files live directly in the cache directory, one per locator, named by the
//! configured [`KeyCodec`]. There is no index: the mapping is recomputed on
//! every lookup. Every failure here is logged and treated as a miss.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::KeyCodec;

/// Disk-based image cache that persists raw encoded bytes.
pub struct DiskImageCache {
    cache_dir: Option<PathBuf>,
    codec: Arc<dyn KeyCodec>,
}

impl DiskImageCache {
    /// Opens the disk tier in `cache_dir`, creating the directory if needed.
    ///
    /// Never fails: without a directory, or if it cannot be created or
    /// written to, the cache is disabled and every operation becomes a no-op.
    pub async fn open(cache_dir: Option<PathBuf>, codec: Arc<dyn KeyCodec>) -> Self {
        let Some(dir) = cache_dir else {
            debug!("No cache directory configured, disk cache disabled");
            return Self::disabled(codec);
        };

        if let Err(e) = fs::create_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "Failed to create cache dir, disk cache disabled");
            return Self::disabled(codec);
        }

        if let Err(e) = check_writable(&dir).await {
            warn!(path = %dir.display(), error = %e, "Cache dir is not writable, disk cache disabled");
            return Self::disabled(codec);
        }

        debug!(path = %dir.display(), "Disk cache enabled");
        Self {
            cache_dir: Some(dir),
            codec,
        }
    }

    /// Creates a disabled cache.
    #[must_use]
    pub fn disabled(codec: Arc<dyn KeyCodec>) -> Self {
        Self {
            cache_dir: None,
            codec,
        }
    }

    /// Returns true if a usable directory backs this cache.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.cache_dir.is_some()
    }

    /// Returns the backing directory, `None` when disabled.
    #[must_use]
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Returns the cache key for a locator.
    #[must_use]
    pub fn key_for(&self, locator: &str) -> CacheKey {
        self.codec.key_for(locator)
    }

    /// Returns the path a locator is cached under.
    #[must_use]
    pub fn path_for(&self, locator: &str) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        Some(dir.join(self.key_for(locator)))
    }

    /// Gets raw image bytes from disk cache.
    pub async fn read(&self, locator: &str) -> Option<Vec<u8>> {
        let path = self.path_for(locator)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(locator = %locator, path = %path.display(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(locator = %locator, "Disk cache miss");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache file");
                None
            }
        }
    }

    /// Stores raw bytes, overwriting any previous file for the locator.
    /// Failures are logged and otherwise ignored.
    pub async fn write(&self, locator: &str, bytes: &[u8]) {
        let Some(mut writer) = self.create_writer(locator).await else {
            return;
        };
        let result = match writer.write_chunk(bytes).await {
            Ok(()) => writer.commit().await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(locator = %locator, error = %e, "Failed to cache to disk");
        }
    }

    /// Starts a streamed write for a locator.
    ///
    /// Returns `None` when the cache is disabled or the file cannot be
    /// created.
    pub async fn create_writer(&self, locator: &str) -> Option<DiskWriter> {
        let dir = self.cache_dir.as_ref()?;
        let key = self.key_for(locator);
        let final_path = dir.join(&key);
        let temp_path = dir.join(temp_name(key.as_str()));

        match fs::File::create(&temp_path).await {
            Ok(file) => Some(DiskWriter {
                file: Some(file),
                temp_path,
                final_path,
                written: 0,
                committed: false,
            }),
            Err(e) => {
                warn!(path = %temp_path.display(), error = %e, "Failed to create cache file");
                None
            }
        }
    }

    /// Deletes every regular file directly in the cache directory.
    /// Subdirectories are left alone.
    pub async fn clear(&self) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to read cache dir");
                return;
            }
        };

        let mut removed = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file {
                continue;
            }
            let path = entry.path();
            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            } else {
                removed += 1;
            }
        }
        debug!(removed, "Cleared disk cache");
    }

    /// Sums the sizes of the files directly in the cache directory.
    /// Downloads still in progress are not counted.
    pub async fn size_bytes(&self) -> u64 {
        let Some(dir) = &self.cache_dir else {
            return 0;
        };
        let Ok(mut entries) = fs::read_dir(dir).await else {
            return 0;
        };

        let mut total = 0u64;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if is_temp_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await
                && meta.is_file()
            {
                total += meta.len();
            }
        }
        total
    }

    /// Checks if a locator has a cached file.
    pub async fn contains(&self, locator: &str) -> bool {
        let Some(path) = self.path_for(locator) else {
            return false;
        };
        fs::try_exists(&path).await.unwrap_or(false)
    }
}

const TEMP_MARKER: &str = ".part-";

fn temp_name(stem: &str) -> String {
    format!("{stem}{TEMP_MARKER}{}", uuid::Uuid::new_v4().simple())
}

fn is_temp_name(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

/// Creates and removes a scratch file to make sure `dir` accepts writes.
async fn check_writable(dir: &Path) -> std::io::Result<()> {
    let path = dir.join(temp_name(".write-check"));
    fs::File::create(&path).await?;
    fs::remove_file(&path).await
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("codec", &self.codec)
            .finish()
    }
}

/// Streams one download into the disk cache.
///
/// Chunks go to a temporary sibling file that replaces the cache file on
/// [`DiskWriter::commit`]. If the writer is dropped before committing, the
/// temporary file is removed.
#[derive(Debug)]
pub struct DiskWriter {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    committed: bool,
}

impl DiskWriter {
    /// Appends a chunk.
    ///
    /// # Errors
    /// Returns error if the chunk cannot be written.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CacheError::Io("Cache file already closed".to_string()))?;
        file.write_all(chunk)
            .await
            .map_err(|e| CacheError::Io(format!("Failed to write cache file: {e}")))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the data and moves it onto the cache file.
    ///
    /// # Errors
    /// Returns error if the file cannot be flushed or renamed.
    pub async fn commit(mut self) -> CacheResult<PathBuf> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| CacheError::Io("Cache file already closed".to_string()))?;
        file.flush()
            .await
            .map_err(|e| CacheError::Io(format!("Failed to flush cache file: {e}")))?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| CacheError::Io(format!("Failed to persist cache file: {e}")))?;
        self.committed = true;

        debug!(path = %self.final_path.display(), size = self.written, "Stored image in disk cache");
        Ok(self.final_path.clone())
    }
}

impl Drop for DiskWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.temp_path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.temp_path.display(), error = %e, "Failed to remove partial cache file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::image::key_codec::HashCodeCodec;
    use tempfile::TempDir;

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache =
            DiskImageCache::open(Some(temp_dir.path().to_path_buf()), Arc::new(HashCodeCodec))
                .await;
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (cache, _temp) = create_test_cache().await;
        let data = b"test image data";

        cache.write("http://x/1.png", data).await;
        let retrieved = cache.read("http://x/1.png").await;

        assert_eq!(retrieved.unwrap(), data);
    }

    #[tokio::test]
    async fn test_file_named_by_key() {
        let (cache, temp) = create_test_cache().await;

        cache.write("hello", b"abc").await;

        assert!(temp.path().join("99162322").is_file());
        assert!(cache.contains("hello").await);
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let (cache, _temp) = create_test_cache().await;

        cache.write("k", b"first version").await;
        cache.write("k", b"second").await;

        assert_eq!(cache.read("k").await.unwrap(), b"second");
        assert_eq!(cache.size_bytes().await, 6);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;
        assert!(cache.read("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_is_not_recursive() {
        let (cache, temp) = create_test_cache().await;
        cache.write("a", b"data1").await;
        cache.write("b", b"data2").await;

        let nested = temp.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("keep"), b"x").unwrap();

        cache.clear().await;

        assert!(cache.read("a").await.is_none());
        assert!(cache.read("b").await.is_none());
        assert!(nested.join("keep").is_file());
        assert_eq!(cache.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_size_bytes() {
        let (cache, _temp) = create_test_cache().await;
        assert_eq!(cache.size_bytes().await, 0);

        cache.write("a", b"hello").await;
        cache.write("b", b"world!").await;

        assert_eq!(cache.size_bytes().await, 11);
    }

    #[tokio::test]
    async fn test_dropped_writer_leaves_nothing() {
        let (cache, temp) = create_test_cache().await;

        let mut writer = cache.create_writer("partial").await.unwrap();
        writer.write_chunk(b"half an image").await.unwrap();
        drop(writer);

        assert!(!cache.contains("partial").await);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_streamed_commit() {
        let (cache, _temp) = create_test_cache().await;

        let mut writer = cache.create_writer("streamed").await.unwrap();
        writer.write_chunk(b"abc").await.unwrap();
        writer.write_chunk(b"def").await.unwrap();
        assert_eq!(writer.written(), 6);
        let path = writer.commit().await.unwrap();

        assert_eq!(Some(path), cache.path_for("streamed"));
        assert_eq!(cache.read("streamed").await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_disabled_without_directory() {
        let cache = DiskImageCache::open(None, Arc::new(HashCodeCodec)).await;

        assert!(!cache.is_enabled());
        cache.write("a", b"data").await;
        assert!(cache.read("a").await.is_none());
        assert!(cache.create_writer("a").await.is_none());
        assert_eq!(cache.size_bytes().await, 0);
        cache.clear().await;
    }

    #[tokio::test]
    async fn test_disabled_when_directory_cannot_be_created() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let cache = DiskImageCache::open(Some(blocker.join("images")), Arc::new(HashCodeCodec)).await;

        assert!(!cache.is_enabled());
        assert!(cache.path_for("a").is_none());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_disabled_when_directory_is_read_only() {
        // procfs refuses file creation even for root.
        let cache = DiskImageCache::open(Some(PathBuf::from("/proc")), Arc::new(HashCodeCodec)).await;

        assert!(!cache.is_enabled());
        assert!(cache.create_writer("a").await.is_none());
    }

    #[tokio::test]
    async fn test_check_writable() {
        let temp = TempDir::new().unwrap();
        assert!(check_writable(temp.path()).await.is_ok());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);

        assert!(check_writable(&temp.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_size_bytes_skips_partial_downloads() {
        let (cache, _temp) = create_test_cache().await;
        cache.write("http://x/done.png", b"12345").await;

        let mut writer = cache.create_writer("http://x/partial.png").await.unwrap();
        writer.write_chunk(b"0123456789").await.unwrap();

        assert_eq!(cache.size_bytes().await, 5);
        writer.commit().await.unwrap();
        assert_eq!(cache.size_bytes().await, 15);
    }
}
