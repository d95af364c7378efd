use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// This data structure lets any thread request a collection, and lets the
/// collector tell a stale cycle from a fresh request.
///
/// Every accepted request bumps the epoch. A cycle snapshots the epoch when
/// it prepares; a later epoch observed mid-closure means a newer request
/// arrived and the in-flight cycle should be abandoned rather than
/// committed.
pub struct CollectionRequester {
    request_flag: AtomicBool,
    epoch: AtomicUsize,
    request_sync: Mutex<()>,
}

impl CollectionRequester {
    pub fn new() -> Self {
        Self {
            request_flag: AtomicBool::new(false),
            epoch: AtomicUsize::new(0),
            request_sync: Mutex::new(()),
        }
    }

    /// Request a collection. Successive requests while one is already
    /// pending are deduplicated; a request arriving after the pending one
    /// was consumed raises the epoch again.
    pub fn request(&self) {
        // Note: This is the double-checked locking algorithm.
        // The load has the `Relaxed` order because we only use the flag to
        // remove successive requests.
        if self.request_flag.load(Ordering::Relaxed) {
            return;
        }
        let _guard = self.request_sync.lock().unwrap();
        if !self.request_flag.load(Ordering::Relaxed) {
            self.request_flag.store(true, Ordering::Relaxed);
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Is a request pending that no cycle has consumed yet?
    pub fn is_pending(&self) -> bool {
        self.request_flag.load(Ordering::Relaxed)
    }

    /// Consume the pending request, so later requests raise the epoch again.
    /// Called when a cycle begins serving the request.
    pub fn clear_request(&self) {
        let _guard = self.request_sync.lock().unwrap();
        self.request_flag.store(false, Ordering::Relaxed);
    }

    /// The current request epoch.
    pub fn epoch(&self) -> usize {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Default for CollectionRequester {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_deduplicated_while_pending() {
        let requester = CollectionRequester::new();
        assert_eq!(requester.epoch(), 0);
        requester.request();
        requester.request();
        assert!(requester.is_pending());
        assert_eq!(requester.epoch(), 1);
    }

    #[test]
    fn epoch_rises_after_clear() {
        let requester = CollectionRequester::new();
        requester.request();
        requester.clear_request();
        assert!(!requester.is_pending());
        requester.request();
        assert_eq!(requester.epoch(), 2);
    }
}
