//! The engine's flat entry points, for embedders that route collector calls
//! through free functions rather than holding a [`GenGC`] method receiver at
//! every call site. Each function is a thin forwarder.

use std::sync::Arc;

use crate::collect::pinned::PinHandle;
use crate::collect::watcher::CollectionWatcher;
use crate::collect::AlreadyRegistered;
use crate::collect::Epoch;
use crate::collect::GcCause;
use crate::collect::GcError;
use crate::gengc::GenGC;
use crate::runtime::Runtime;
use crate::util::address::ObjectReference;

/// Request a collection and block until a cycle satisfying it has run.
pub fn request_collection<R: Runtime>(gc: &GenGC<R>, cause: GcCause) -> Result<(), GcError> {
    gc.request_collection(cause)
}

/// Request a collection whose cycle runs a complete pass regardless of the
/// installed policy.
pub fn request_complete_collection<R: Runtime>(
    gc: &GenGC<R>,
    cause: GcCause,
) -> Result<(), GcError> {
    gc.request_complete_collection(cause)
}

/// The number of cycles that have run.
pub fn current_epoch<R: Runtime>(gc: &GenGC<R>) -> Epoch {
    gc.current_epoch()
}

/// Add a watcher to be notified around each cycle.
pub fn register_watcher<R: Runtime>(
    gc: &GenGC<R>,
    watcher: Arc<dyn CollectionWatcher>,
) -> Result<(), AlreadyRegistered> {
    gc.register_watcher(watcher)
}

/// Request removal of a registered watcher.
pub fn unregister_watcher<R: Runtime>(gc: &GenGC<R>, watcher: &dyn CollectionWatcher) {
    gc.unregister_watcher(watcher)
}

/// Pin an object so its bytes are not moved while the returned handle lives.
pub fn pin_object<'g, R: Runtime>(
    gc: &'g GenGC<R>,
    obj: ObjectReference,
) -> Option<PinHandle<'g>> {
    gc.pin_object(obj)
}

/// Lifetime (incremental, complete) cycle counts.
pub fn collection_counts<R: Runtime>(gc: &GenGC<R>) -> (u64, u64) {
    gc.collection_counts()
}

/// The GC load of the last cycle, as a rounded percentage of wall time.
pub fn last_gc_load_percent<R: Runtime>(gc: &GenGC<R>) -> Option<u64> {
    gc.last_gc_load_percent()
}

/// Log the lifetime accounting summary, if enabled by options.
pub fn log_gc_summary<R: Runtime>(gc: &GenGC<R>) {
    gc.log_summary()
}
