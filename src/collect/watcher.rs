//! Collection watchers: embedder callbacks around each cycle.
//!
//! A watcher is notified inside the cycle body (before and after tracing,
//! with mutators parked) and once more from the requesting thread after the
//! cycle (the report phase). Watcher failures are logged and swallowed; a
//! failing watcher never affects the cycle or its peers.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use crate::collect::AlreadyRegistered;

pub type WatcherResult = Result<(), Box<dyn std::error::Error>>;

/// Registration state embedded in each watcher. `listed` is set on first
/// registration and never cleared, which is what makes watchers single-use.
pub struct WatcherMark {
    listed: AtomicBool,
    removed: AtomicBool,
}

impl WatcherMark {
    pub const fn new() -> Self {
        WatcherMark {
            listed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        }
    }
}

impl Default for WatcherMark {
    fn default() -> Self {
        Self::new()
    }
}

/// An embedder callback observing collection cycles. Implementations own a
/// [`WatcherMark`] and return it from [`mark`]; the registry stores its
/// bookkeeping there.
///
/// [`mark`]: CollectionWatcher::mark
pub trait CollectionWatcher: Send + Sync {
    fn mark(&self) -> &WatcherMark;

    /// Called inside the cycle body, before tracing. Mutators are parked;
    /// the callback must not allocate on the managed heap.
    fn before_collection(&self) -> WatcherResult {
        Ok(())
    }

    /// Called inside the cycle body, after tracing. Same constraints as
    /// [`before_collection`](CollectionWatcher::before_collection).
    fn after_collection(&self) -> WatcherResult {
        Ok(())
    }

    /// Called on the requesting thread after the cycle, outside the
    /// collection latch. Allocation is allowed here.
    fn report(&self) -> WatcherResult {
        Ok(())
    }
}

/// The registered watchers. Registration prepends; visiting iterates in
/// registration-reversed order.
pub struct WatcherRegistry {
    entries: Mutex<Vec<Arc<dyn CollectionWatcher>>>,
}

impl WatcherRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        WatcherRegistry {
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Add `watcher` to the registry. Fails if the watcher's mark shows it
    /// was ever registered before, including watchers currently registered.
    pub fn register(&self, watcher: Arc<dyn CollectionWatcher>) -> Result<(), AlreadyRegistered> {
        if watcher.mark().listed.swap(true, Ordering::SeqCst) {
            return Err(AlreadyRegistered);
        }
        self.entries.lock().unwrap().insert(0, watcher);
        Ok(())
    }

    /// Request removal of `watcher`. The entry is unlinked lazily, by the
    /// scrub at the start of the next cycle; until then visits skip it.
    /// Unregistering a watcher that is not registered is a no-op.
    pub fn unregister(&self, watcher: &dyn CollectionWatcher) {
        watcher.mark().removed.store(true, Ordering::SeqCst);
    }

    /// Unlink entries whose removal was requested. Runs at the start of the
    /// cycle body, so it never races a visit.
    pub fn scrub(&self) {
        self.entries
            .lock()
            .unwrap()
            .retain(|w| !w.mark().removed.load(Ordering::SeqCst));
    }

    /// Run each live watcher's before-collection callback.
    pub fn visit_before(&self) {
        self.visit_live("before-collection", |w| w.before_collection());
    }

    /// Run each live watcher's after-collection callback.
    pub fn visit_after(&self) {
        self.visit_live("after-collection", |w| w.after_collection());
    }

    /// Run each watcher's report callback. Runs outside the latch, so a
    /// watcher unregistered after the cycle's after-collection visit may
    /// still receive this one report.
    pub fn visit_report(&self) {
        let snapshot = self.entries.lock().unwrap().clone();
        for watcher in &snapshot {
            if let Err(err) = watcher.report() {
                warn!("collection watcher report failed: {}", err);
            }
        }
    }

    fn visit_live(
        &self,
        phase: &str,
        f: impl Fn(&dyn CollectionWatcher) -> WatcherResult,
    ) {
        let snapshot = self.entries.lock().unwrap().clone();
        for watcher in &snapshot {
            if watcher.mark().removed.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(err) = f(watcher.as_ref()) {
                warn!("collection watcher {} callback failed: {}", phase, err);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingWatcher {
        mark: WatcherMark,
        before_calls: AtomicUsize,
        after_calls: AtomicUsize,
        report_calls: AtomicUsize,
        fail_before: bool,
    }

    impl CountingWatcher {
        fn new(fail_before: bool) -> Arc<Self> {
            Arc::new(CountingWatcher {
                mark: WatcherMark::new(),
                before_calls: AtomicUsize::new(0),
                after_calls: AtomicUsize::new(0),
                report_calls: AtomicUsize::new(0),
                fail_before,
            })
        }
    }

    impl CollectionWatcher for CountingWatcher {
        fn mark(&self) -> &WatcherMark {
            &self.mark
        }

        fn before_collection(&self) -> WatcherResult {
            self.before_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_before {
                return Err("synthetic watcher failure".into());
            }
            Ok(())
        }

        fn after_collection(&self) -> WatcherResult {
            self.after_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn report(&self) -> WatcherResult {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn registering_twice_fails() {
        let registry = WatcherRegistry::with_capacity(4);
        let watcher = CountingWatcher::new(false);
        assert!(registry.register(watcher.clone()).is_ok());
        assert_eq!(registry.register(watcher.clone()), Err(AlreadyRegistered));
    }

    #[test]
    fn reuse_after_unregister_fails() {
        let registry = WatcherRegistry::with_capacity(4);
        let watcher = CountingWatcher::new(false);
        registry.register(watcher.clone()).unwrap();
        registry.unregister(watcher.as_ref());
        registry.scrub();
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.register(watcher), Err(AlreadyRegistered));
    }

    #[test]
    fn failing_watcher_does_not_affect_peers() {
        let registry = WatcherRegistry::with_capacity(4);
        let failing = CountingWatcher::new(true);
        let healthy = CountingWatcher::new(false);
        registry.register(failing.clone()).unwrap();
        registry.register(healthy.clone()).unwrap();
        registry.visit_before();
        registry.visit_after();
        registry.visit_report();
        assert_eq!(failing.before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.before_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.after_calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.report_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_watcher_is_skipped_before_scrub() {
        let registry = WatcherRegistry::with_capacity(4);
        let watcher = CountingWatcher::new(false);
        registry.register(watcher.clone()).unwrap();
        registry.unregister(watcher.as_ref());
        registry.visit_before();
        assert_eq!(watcher.before_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn double_unregister_is_a_no_op() {
        let registry = WatcherRegistry::with_capacity(4);
        let watcher = CountingWatcher::new(false);
        registry.register(watcher.clone()).unwrap();
        registry.unregister(watcher.as_ref());
        registry.unregister(watcher.as_ref());
        registry.scrub();
        assert_eq!(registry.len(), 0);
    }
}
