//! Event-channel delivery of load results.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::entities::CachedImage;
use crate::domain::ports::ImageSubscriber;

/// Message sent when an image finishes loading.
#[derive(Debug, Clone)]
pub struct ImageLoadedEvent {
    /// Locator the image was requested with.
    pub locator: String,
    /// The loaded image, or `None` if it could not be loaded.
    pub image: Option<Arc<CachedImage>>,
}

/// Forwards results into an event channel. Interest ends when the
/// receiving side is dropped.
impl ImageSubscriber for mpsc::UnboundedSender<ImageLoadedEvent> {
    fn on_result(&self, locator: &str, image: Option<Arc<CachedImage>>) {
        let event = ImageLoadedEvent {
            locator: locator.to_string(),
            image,
        };
        if self.send(event).is_err() {
            trace!(locator = %locator, "Event receiver gone");
        }
    }

    fn is_still_interested(&self) -> bool {
        !self.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(tx.is_still_interested());

        tx.on_result("http://x/a.png", None);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.locator, "http://x/a.png");
        assert!(event.image.is_none());
    }

    #[test]
    fn test_closed_receiver_ends_interest() {
        let (tx, rx) = mpsc::unbounded_channel::<ImageLoadedEvent>();
        drop(rx);
        assert!(!tx.is_still_interested());
    }
}
