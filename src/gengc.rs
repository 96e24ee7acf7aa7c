//! An instance of the collection engine, bound to one embedding runtime.

use std::sync::Arc;
use std::sync::Mutex;

use crate::collect::accounting::Accounting;
use crate::collect::controller::Controller;
use crate::collect::pinned::PinHandle;
use crate::collect::pinned::PinnedObjects;
use crate::collect::timers::Timers;
use crate::collect::watcher::CollectionWatcher;
use crate::collect::watcher::WatcherRegistry;
use crate::collect::AlreadyRegistered;
use crate::collect::Epoch;
use crate::collect::GcCause;
use crate::collect::GcError;
use crate::runtime::Generation;
use crate::runtime::Heap;
use crate::runtime::Runtime;
use crate::util::address::ObjectReference;
use crate::util::options::Options;

/// The collection engine. One instance per embedding runtime; everything the
/// engine owns hangs off it, so there is no global state and two engines in
/// one process do not interfere.
pub struct GenGC<R: Runtime> {
    runtime: Arc<R>,
    options: Arc<Options>,
    controller: Controller<R>,
    accounting: Mutex<Accounting>,
    timers: Timers,
    watchers: WatcherRegistry,
    pinned: PinnedObjects,
}

impl<R: Runtime> GenGC<R> {
    pub fn new(runtime: Arc<R>, options: Options) -> Self {
        // A logger installed by the embedder wins; ours is best-effort.
        let _ = crate::util::logger::try_init();
        let accounting = Accounting::new(options.gc_history, options.detailed_accounting);
        let watchers = WatcherRegistry::with_capacity(options.watcher_capacity);
        let pinned = PinnedObjects::with_capacity(options.pin_capacity);
        let controller = Controller::new(options.policy);
        GenGC {
            runtime,
            options: Arc::new(options),
            controller,
            accounting: Mutex::new(accounting),
            timers: Timers::new(),
            watchers,
            pinned,
        }
    }

    /// Request a collection and block until a cycle satisfying it has run.
    /// The installed policy decides which passes that cycle executes.
    pub fn request_collection(&self, cause: GcCause) -> Result<(), GcError> {
        self.controller.request_collection(self, cause)
    }

    /// Request a collection whose cycle runs a complete pass regardless of
    /// the installed policy.
    pub fn request_complete_collection(&self, cause: GcCause) -> Result<(), GcError> {
        self.controller.request_complete_collection(self, cause)
    }

    /// The number of cycles that have run.
    pub fn current_epoch(&self) -> Epoch {
        self.controller.current_epoch()
    }

    /// Whether the last cycle ran a complete pass.
    pub fn last_collection_was_complete(&self) -> bool {
        self.controller.last_collection_was_complete()
    }

    /// Add a watcher to be notified around each cycle. Watchers are
    /// single-use; a watcher that was ever registered before is rejected.
    pub fn register_watcher(
        &self,
        watcher: Arc<dyn CollectionWatcher>,
    ) -> Result<(), AlreadyRegistered> {
        self.watchers.register(watcher)
    }

    /// Request removal of a registered watcher. It receives no callbacks
    /// from now on, except possibly one in-flight report.
    pub fn unregister_watcher(&self, watcher: &dyn CollectionWatcher) {
        self.watchers.unregister(watcher)
    }

    /// Pin `obj` so its bytes are not moved while the returned handle lives.
    /// Fails only when the pin registry is full.
    pub fn pin_object(&self, obj: ObjectReference) -> Option<PinHandle<'_>> {
        self.pinned.pin(obj)
    }

    /// Log the lifetime accounting summary, if the `print_gc_summary`
    /// option is on. Meant to run at shutdown.
    pub fn log_summary(&self) {
        if !self.options.print_gc_summary {
            return;
        }
        let heap = self.runtime.heap();
        let accounting = self.accounting.lock().unwrap();
        // Young-generation bytes in use now would be counted by the next
        // cycle; fold them in so the summary is consistent at any instant.
        let allocated =
            accounting.normal_chunk_bytes() + heap.young().used_chunk_bytes();
        info!("GC summary: allocated chunk bytes: {}", allocated);
        if self.options.detailed_accounting {
            let allocated_objects =
                accounting.normal_object_bytes() + heap.young().used_object_bytes();
            info!("GC summary: allocated object bytes: {}", allocated_objects);
            info!(
                "GC summary: collected object bytes: {}",
                accounting.collected_total_object_bytes()
            );
        }
        info!(
            "GC summary: collected chunk bytes: {}",
            accounting.collected_total_chunk_bytes()
        );
        info!(
            "GC summary: promoted chunk bytes: {}",
            accounting.promoted_total_chunk_bytes()
        );
        info!(
            "GC summary: copied chunk bytes: {}",
            accounting.copied_total_chunk_bytes()
        );
        let incremental_nanos = accounting.incremental_total_nanos();
        let complete_nanos = accounting.complete_total_nanos();
        info!(
            "GC summary: incremental collections: {} ({} ns)",
            accounting.incremental_count(),
            incremental_nanos
        );
        info!(
            "GC summary: complete collections: {} ({} ns)",
            accounting.complete_count(),
            complete_nanos
        );
        let total_nanos = incremental_nanos + complete_nanos;
        let uptime = self.timers.nanos_since_start();
        if uptime > 0 {
            info!(
                "GC summary: lifetime GC load: {}%",
                (100 * total_nanos + uptime / 2) / uptime
            );
        }
    }

    /// Lifetime (incremental, complete) cycle counts.
    pub fn collection_counts(&self) -> (u64, u64) {
        let accounting = self.accounting.lock().unwrap();
        (accounting.incremental_count(), accounting.complete_count())
    }

    /// The GC load of the last cycle, as a rounded percentage of wall time.
    pub fn last_gc_load_percent(&self) -> Option<u64> {
        self.timers.gc_load_percent()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The phase timer table, for embedder monitoring.
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub(crate) fn accounting(&self) -> &Mutex<Accounting> {
        &self.accounting
    }

    pub(crate) fn watchers(&self) -> &WatcherRegistry {
        &self.watchers
    }

    pub(crate) fn pinned(&self) -> &PinnedObjects {
        &self.pinned
    }
}
