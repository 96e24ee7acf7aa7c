//! Cycle orchestration: request entry points, the safepoint-serialized cycle
//! body, the out-of-memory retry, and the post-cycle epilogue.
//!
//! A request captures the current epoch, then asks the safepoint substrate
//! to park every mutator and run the cycle body. The body increments the
//! epoch exactly once per physical cycle, so requests captured at the same
//! epoch coalesce: whichever runs first satisfies the rest, and their bodies
//! are skipped.

use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use crate::collect::accounting::GenerationBytes;
use crate::collect::policy;
use crate::collect::policy::CollectionPolicy;
use crate::collect::policy::PolicyContext;
use crate::collect::timers::GcPhase;
use crate::collect::tracer::Tracer;
use crate::collect::Epoch;
use crate::collect::GcCause;
use crate::collect::GcError;
use crate::gengc::GenGC;
use crate::runtime::Generation;
use crate::runtime::Heap;
use crate::runtime::RefProcessing;
use crate::runtime::Runtime;
use crate::runtime::Safepoint;
use crate::runtime::SoftRefPolicy;
use crate::runtime::YoungGeneration;
use crate::util::options::PolicySelector;

pub struct Controller<R: Runtime> {
    /// Count of physical cycles that have started. Requests coalesce on it.
    epoch: AtomicU64,
    /// Set for the duration of a cycle body. The safepoint substrate already
    /// serializes bodies; this catches a broken substrate re-entering one.
    in_progress: AtomicBool,
    policy: Mutex<Arc<dyn CollectionPolicy>>,
    /// The policy forced by complete-collection requests and the
    /// out-of-memory retry.
    complete_only: Arc<dyn CollectionPolicy>,
    /// Whether the last cycle ran a complete pass.
    complete_collection: AtomicBool,
    /// Heap chunk bytes at the start of the current cycle, for the one-line
    /// cycle log.
    size_before: AtomicUsize,
    _marker: PhantomData<R>,
}

impl<R: Runtime> Controller<R> {
    pub fn new(selector: PolicySelector) -> Self {
        Controller {
            epoch: AtomicU64::new(0),
            in_progress: AtomicBool::new(false),
            policy: Mutex::new(policy::from_selector(selector)),
            complete_only: policy::from_selector(PolicySelector::OnlyCompletely),
            complete_collection: AtomicBool::new(false),
            size_before: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    pub fn current_epoch(&self) -> Epoch {
        Epoch::from_u64(self.epoch.load(Ordering::SeqCst))
    }

    /// Whether the last cycle ran a complete pass.
    pub fn last_collection_was_complete(&self) -> bool {
        self.complete_collection.load(Ordering::SeqCst)
    }

    /// Request a collection and block until a cycle satisfying it has run.
    /// The installed policy decides which passes that cycle executes.
    pub fn request_collection(&self, gc: &GenGC<R>, cause: GcCause) -> Result<(), GcError> {
        let request_epoch = self.current_epoch();
        debug!(
            "collection requested: cause={} epoch={}",
            cause.name(),
            request_epoch
        );
        let oom = gc.runtime().safepoint().park_and_run(
            &|| self.current_epoch() == request_epoch,
            &mut || self.collect_operation(gc, cause),
        );
        if oom {
            // Surfaced before the epilogue so the requester learns about the
            // failure first; pending references drain on a later request.
            return Err(GcError::OutOfMemory);
        }
        self.possible_collection_epilogue(gc, request_epoch);
        Ok(())
    }

    /// Request a collection whose cycle runs a complete pass regardless of
    /// the installed policy. Requests that coalesce into the same cycle also
    /// collect completely; they asked for at least as much.
    pub fn request_complete_collection(
        &self,
        gc: &GenGC<R>,
        cause: GcCause,
    ) -> Result<(), GcError> {
        let previous = {
            let mut installed = self.policy.lock().unwrap();
            mem::replace(&mut *installed, self.complete_only.clone())
        };
        let result = self.request_collection(gc, cause);
        *self.policy.lock().unwrap() = previous;
        result
    }

    /// The cycle body. Runs with every mutator parked, on exactly one
    /// thread. Returns whether the cycle reported out-of-memory.
    fn collect_operation(&self, gc: &GenGC<R>, cause: GcCause) -> bool {
        let timers = gc.timers();
        timers.close(GcPhase::Mutator);
        self.start_collection_or_exit();
        timers.reset_all();
        let epoch = Epoch::from_u64(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
        gc.runtime().heap().flush_thread_local_allocation();
        self.log_before(gc, epoch, cause);
        gc.watchers().scrub();
        {
            let _scope = timers.scoped(GcPhase::WatchersBefore);
            gc.watchers().visit_before();
        }
        let oom = self.collect_impl(gc, cause, epoch);
        {
            let _scope = timers.scoped(GcPhase::WatchersAfter);
            gc.watchers().visit_after();
        }
        self.log_after(gc, epoch, cause);
        self.finish_collection();
        timers.open(GcPhase::Mutator);
        oom
    }

    fn start_collection_or_exit(&self) {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            error!("a collection request re-entered the cycle body");
            panic!("collection already in progress; safepoint invariant violated");
        }
    }

    fn finish_collection(&self) {
        debug_assert!(self.in_progress.load(Ordering::SeqCst));
        self.in_progress.store(false, Ordering::SeqCst);
    }

    fn collect_impl(&self, gc: &GenGC<R>, cause: GcCause, epoch: Epoch) -> bool {
        let heap = gc.runtime().heap();
        debug_assert!(heap.young().to_space_is_empty());
        debug_assert!(heap.old().to_space_is_empty());
        {
            let _scope = gc.timers().scoped(GcPhase::VerifyBefore);
            gc.runtime().verify_before(cause, epoch);
        }
        let installed = self.policy.lock().unwrap().clone();
        let mut oom = self.do_collect(gc, installed.as_ref(), SoftRefPolicy::Normal);
        if oom {
            info!("retrying collection: complete pass, soft references treated as weak");
            oom = self.do_collect(gc, self.complete_only.as_ref(), SoftRefPolicy::TreatAsWeak);
        }
        {
            let _scope = gc.timers().scoped(GcPhase::VerifyAfter);
            gc.runtime().verify_after(cause, epoch);
        }
        if cfg!(debug_assertions)
            && (!heap.young().to_space_is_empty() || !heap.old().to_space_is_empty())
        {
            error!(
                "to-half not empty after cycle {}: young_empty={} old_empty={}",
                epoch,
                heap.young().to_space_is_empty(),
                heap.old().to_space_is_empty()
            );
            // One more verification pass for its diagnostics before dying.
            gc.runtime().verify_after(cause, epoch);
            panic!("a generation's to-half is not empty after the cycle");
        }
        oom
    }

    /// One policy-driven collection: incremental pass, complete decision,
    /// complete pass, accounting, budget check. Returns whether the heap is
    /// over budget afterwards.
    fn do_collect(
        &self,
        gc: &GenGC<R>,
        policy: &dyn CollectionPolicy,
        soft: SoftRefPolicy,
    ) -> bool {
        let runtime = gc.runtime();
        let heap = runtime.heap();
        let detailed = gc.options().detailed_accounting;
        let mut accounting = gc.accounting().lock().unwrap();
        accounting.before_collection(Self::sample(heap, detailed));
        let complete;
        {
            let _scope = gc.timers().scoped(GcPhase::Collection);
            let tracer = Tracer::new(runtime, gc.timers(), gc.pinned());
            let incremental = policy.collect_incrementally(&PolicyContext {
                accounting: &*accounting,
                young_used_bytes: heap.young().used_chunk_bytes(),
                old_used_bytes: heap.old().used_chunk_bytes(),
                max_heap_bytes: gc.options().max_heap_bytes,
            });
            if incremental {
                self.scavenge(gc, &tracer, true, soft);
            }
            // Asked after the incremental pass so the answer sees its
            // promotions.
            complete = policy.collect_completely(&PolicyContext {
                accounting: &*accounting,
                young_used_bytes: heap.young().used_chunk_bytes(),
                old_used_bytes: heap.old().used_chunk_bytes(),
                max_heap_bytes: gc.options().max_heap_bytes,
            });
            self.complete_collection.store(complete, Ordering::SeqCst);
            if complete {
                self.scavenge(gc, &tracer, false, soft);
            }
        }
        let collection_nanos = gc
            .timers()
            .last_interval_nanos(GcPhase::Collection)
            .unwrap_or(0);
        accounting.after_collection(complete, Self::sample(heap, detailed), collection_nanos);
        // Survivor areas are young-generation chunks that a future cycle
        // will promote; they count against the budget together with the old
        // generation.
        let used = accounting.old_chunk_bytes_after() + heap.young().survivor_chunk_bytes();
        let max = gc.options().max_heap_bytes;
        runtime.ref_processing().after_collection(used, max);
        used > max
    }

    /// One tracing pass plus its reference processing, space release and
    /// from/to flip.
    fn scavenge(&self, gc: &GenGC<R>, tracer: &Tracer<'_, R>, incremental: bool, soft: SoftRefPolicy) {
        let timers = gc.timers();
        {
            let _scope = timers.scoped(GcPhase::RootScan);
            if incremental {
                tracer.scan_from_dirty_roots();
            } else {
                tracer.scan_from_roots();
            }
        }
        {
            let _scope = timers.scoped(GcPhase::ReferenceObjects);
            let refs = gc.runtime().ref_processing();
            let pending = refs.process_discovered(soft);
            refs.enqueue_pending(pending);
        }
        {
            let _scope = timers.scoped(GcPhase::ReleaseSpaces);
            tracer.release_spaces(!incremental);
        }
        tracer.swap_spaces();
    }

    fn sample(heap: &R::Heap, detailed: bool) -> GenerationBytes {
        GenerationBytes {
            young_chunk: heap.young().used_chunk_bytes(),
            old_chunk: heap.old().used_chunk_bytes(),
            young_object: if detailed {
                heap.young().used_object_bytes()
            } else {
                0
            },
            old_object: if detailed {
                heap.old().used_object_bytes()
            } else {
                0
            },
        }
    }

    fn log_before(&self, gc: &GenGC<R>, epoch: Epoch, cause: GcCause) {
        let heap = gc.runtime().heap();
        let used = heap.young().used_chunk_bytes() + heap.old().used_chunk_bytes();
        self.size_before.store(used, Ordering::SeqCst);
        if epoch.as_u64() == 1 {
            debug!(
                "heap configuration: policy={} max_heap_bytes={}",
                self.policy.lock().unwrap().name(),
                gc.options().max_heap_bytes
            );
        }
        debug!("collection starting: epoch={} cause={}", epoch, cause.name());
    }

    fn log_after(&self, gc: &GenGC<R>, epoch: Epoch, cause: GcCause) {
        let heap = gc.runtime().heap();
        let after = heap.young().used_chunk_bytes() + heap.old().used_chunk_bytes();
        let before = self.size_before.load(Ordering::SeqCst);
        let kind = if self.last_collection_was_complete() {
            "Full GC"
        } else {
            "Incremental GC"
        };
        let nanos = gc
            .timers()
            .last_interval_nanos(GcPhase::Collection)
            .unwrap_or(0);
        info!(
            "[{}: {} ({}) {}K->{}K, {:.7} secs]",
            epoch,
            kind,
            cause.name(),
            before / 1024,
            after / 1024,
            nanos as f64 / 1e9,
        );
        gc.timers().log_times();
    }

    /// Post-cycle work that must not run inside the cycle: draining the
    /// pending-reference queue and the watcher report visit. Skipped when
    /// the calling thread cannot safely synchronize.
    fn possible_collection_epilogue(&self, gc: &GenGC<R>, request_epoch: Epoch) {
        if self.current_epoch() <= request_epoch {
            return;
        }
        let safepoint = gc.runtime().safepoint();
        if safepoint.in_operation() {
            // A lock needed by the drain may be held outside the operation.
            return;
        }
        if !safepoint.thread_attached() {
            return;
        }
        let start = Instant::now();
        gc.runtime().ref_processing().drain_pending();
        debug!(
            "drained pending references in {}ns",
            start.elapsed().as_nanos()
        );
        safepoint.run_serialized(&mut || gc.watchers().visit_report());
    }
}
