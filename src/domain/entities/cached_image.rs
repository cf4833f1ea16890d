//! Decoded image as held by the memory tier.

use image::DynamicImage;

/// A decoded image together with the memory it accounts for.
///
/// The cost is the size of the raw pixel buffer
/// (width × height × bytes per pixel). Instances are shared as
/// `Arc<CachedImage>` and never mutated once built.
#[derive(Debug)]
pub struct CachedImage {
    image: DynamicImage,
    cost: usize,
}

impl CachedImage {
    /// Wraps a decoded image, computing its cost from the pixel buffer.
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        let cost = image.as_bytes().len();
        Self { image, cost }
    }

    /// Returns the decoded pixels.
    #[must_use]
    pub const fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Bytes this image accounts for in the memory tier.
    #[must_use]
    pub const fn cost(&self) -> usize {
        self.cost
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl From<DynamicImage> for CachedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory LRU tier.
    MemoryCache,
    /// Decoded from a file in the disk tier.
    DiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}
