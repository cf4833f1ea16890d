//! Port for consumers that want to be told when an image is ready.

use std::sync::Arc;

use crate::domain::entities::CachedImage;

/// Receives the outcome of a load.
///
/// Delivery happens at most once per subscription, on a runtime worker
/// thread, and only while [`ImageSubscriber::is_still_interested`] holds.
pub trait ImageSubscriber: Send + Sync + 'static {
    /// Called with the decoded image, or `None` if it could not be loaded.
    fn on_result(&self, locator: &str, image: Option<Arc<CachedImage>>);

    /// Polled right before delivery.
    fn is_still_interested(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every delivery it receives.
    pub struct RecordingSubscriber {
        interested: AtomicBool,
        received: Mutex<Vec<(String, Option<Arc<CachedImage>>)>>,
    }

    impl RecordingSubscriber {
        pub fn new() -> Self {
            Self {
                interested: AtomicBool::new(true),
                received: Mutex::new(Vec::new()),
            }
        }

        pub fn lose_interest(&self) {
            self.interested.store(false, Ordering::SeqCst);
        }

        pub fn received(&self) -> Vec<(String, Option<Arc<CachedImage>>)> {
            self.received.lock().clone()
        }
    }

    impl ImageSubscriber for RecordingSubscriber {
        fn on_result(&self, locator: &str, image: Option<Arc<CachedImage>>) {
            self.received.lock().push((locator.to_string(), image));
        }

        fn is_still_interested(&self) -> bool {
            self.interested.load(Ordering::SeqCst)
        }
    }
}
