//! Image decoding with allocation limits.

use std::io::Cursor;
use std::path::Path;

use image::error::{ImageError, LimitErrorKind};
use image::{DynamicImage, ImageReader, Limits};

use crate::domain::errors::{CacheError, CacheResult};

/// Decodes encoded image bytes, refusing to allocate more than a fixed
/// budget per image.
///
/// Exceeding the budget surfaces as [`CacheError::OutOfMemory`] so callers
/// can relieve memory pressure.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: Limits,
}

impl ImageDecoder {
    /// Creates a decoder allowing at most `max_alloc` bytes per image.
    #[must_use]
    pub fn new(max_alloc: u64) -> Self {
        let mut limits = Limits::default();
        limits.max_alloc = Some(max_alloc);
        Self { limits }
    }

    /// Decodes an in-memory buffer.
    ///
    /// # Errors
    /// Returns `Decode` for unknown or corrupt data, `OutOfMemory` when the
    /// allocation limit is hit.
    pub fn decode_bytes(&self, bytes: &[u8]) -> CacheResult<DynamicImage> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CacheError::Decode(format!("Failed to guess format: {e}")))?;
        reader.limits(self.limits.clone());
        reader.decode().map_err(classify)
    }

    /// Decodes the file at `path`.
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be opened, otherwise as
    /// [`ImageDecoder::decode_bytes`].
    pub fn decode_file(&self, path: &Path) -> CacheResult<DynamicImage> {
        let mut reader = ImageReader::open(path)
            .map_err(|e| CacheError::Io(format!("Failed to open {}: {e}", path.display())))?
            .with_guessed_format()
            .map_err(|e| CacheError::Decode(format!("Failed to guess format: {e}")))?;
        reader.limits(self.limits.clone());
        reader.decode().map_err(classify)
    }
}

fn classify(error: ImageError) -> CacheError {
    match error {
        ImageError::Limits(e) if e.kind() == LimitErrorKind::InsufficientMemory => {
            CacheError::OutOfMemory(e.to_string())
        }
        ImageError::IoError(e) => CacheError::Io(e.to_string()),
        other => CacheError::Decode(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::png_bytes;
    use image::error::LimitError;

    #[test]
    fn test_decode_png() {
        let decoder = ImageDecoder::new(1024 * 1024);
        let img = decoder.decode_bytes(&png_bytes(8, 6)).unwrap();
        assert_eq!((img.width(), img.height()), (8, 6));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let decoder = ImageDecoder::new(1024 * 1024);
        let result = decoder.decode_bytes(b"definitely not an image");
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_allocation_limit_is_out_of_memory() {
        let decoder = ImageDecoder::new(64);
        let result = decoder.decode_bytes(&png_bytes(64, 64));
        assert!(matches!(result, Err(CacheError::OutOfMemory(_))));
    }

    #[test]
    fn test_classify_limits() {
        let oom = ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory));
        assert!(classify(oom).is_out_of_memory());

        let dims = ImageError::Limits(LimitError::from_kind(LimitErrorKind::DimensionError));
        assert!(matches!(classify(dims), CacheError::Decode(_)));
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("123");
        std::fs::write(&path, png_bytes(3, 2)).unwrap();

        let decoder = ImageDecoder::new(1024 * 1024);
        let img = decoder.decode_file(&path).unwrap();
        assert_eq!(img.width(), 3);

        let missing = decoder.decode_file(&dir.path().join("missing"));
        assert!(matches!(missing, Err(CacheError::Io(_))));
    }
}
