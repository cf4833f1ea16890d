//! Key codecs naming disk cache files.

use sha2::{Digest, Sha256};

use crate::domain::entities::CacheKey;
use crate::domain::ports::KeyCodec;

/// 32-bit polynomial string hash (`h = 31 * h + c` over UTF-16 code units,
/// wrapping), rendered as a signed decimal number.
///
/// File names are short and compatible with caches written by earlier
/// clients, at the price of possible collisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCodeCodec;

impl HashCodeCodec {
    /// Computes the raw 32-bit hash.
    #[must_use]
    pub fn hash(locator: &str) -> i32 {
        locator
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }
}

impl KeyCodec for HashCodeCodec {
    fn key_for(&self, locator: &str) -> CacheKey {
        CacheKey::new(Self::hash(locator).to_string())
    }
}

/// First 16 bytes of the SHA-256 digest of the locator, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Codec;

impl KeyCodec for Sha256Codec {
    fn key_for(&self, locator: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(locator.as_bytes());
        let result = hasher.finalize();
        CacheKey::new(hex::encode(&result[..16]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", 0 ; "empty")]
    #[test_case("hello", 99_162_322 ; "ascii")]
    #[test_case("polygenelubricants", i32::MIN ; "wraps_to_min")]
    fn test_hash_code_values(input: &str, expected: i32) {
        assert_eq!(HashCodeCodec::hash(input), expected);
    }

    #[test]
    fn test_hash_code_key_is_decimal() {
        let key = HashCodeCodec.key_for("polygenelubricants");
        assert_eq!(key.as_str(), "-2147483648");
    }

    #[test]
    fn test_keys_are_deterministic() {
        let url = "https://example.com/image.png";
        assert_eq!(HashCodeCodec.key_for(url), HashCodeCodec.key_for(url));
        assert_eq!(Sha256Codec.key_for(url), Sha256Codec.key_for(url));
    }

    #[test]
    fn test_sha256_key_shape() {
        let key = Sha256Codec.key_for("https://example.com/attachments/123/456/image.png");
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_locators_differ() {
        let a = Sha256Codec.key_for("http://x/a.png");
        let b = Sha256Codec.key_for("http://x/b.png");
        assert_ne!(a, b);
    }
}
