//! The tracing/copying pass: Cheney scans from roots, with the grey frontier
//! kept in the to-halves of the generations rather than on an explicit work
//! list.
//!
//! Colors follow the usual convention. An object needing promotion is white;
//! copying it (or promoting its chunk in place) makes it grey; visiting its
//! slots makes it black. A generation hands back its grey objects through
//! [`Generation::scan_grey_objects`], and the tracer drives that to a
//! fixpoint.

use crate::collect::pinned::PinnedObjects;
use crate::collect::timers::GcPhase;
use crate::collect::timers::Timers;
use crate::runtime::CodeCache;
use crate::runtime::Frame;
use crate::runtime::FrameRefs;
use crate::runtime::Generation;
use crate::runtime::Heap;
use crate::runtime::OldGeneration;
use crate::runtime::RefStrength;
use crate::runtime::Runtime;
use crate::runtime::StackWalker;
use crate::util::address::Address;

pub struct Tracer<'a, R: Runtime> {
    runtime: &'a R,
    timers: &'a Timers,
    pinned: &'a PinnedObjects,
}

impl<'a, R: Runtime> Tracer<'a, R> {
    pub fn new(runtime: &'a R, timers: &'a Timers, pinned: &'a PinnedObjects) -> Self {
        Tracer {
            runtime,
            timers,
            pinned,
        }
    }

    fn heap(&self) -> &R::Heap {
        self.runtime.heap()
    }

    /// The complete pass: treat both generations' from-halves as white and
    /// trace everything reachable.
    pub fn scan_from_roots(&self) {
        let _scope = self.timers.scoped(GcPhase::ScanFromRoots);
        self.heap().old().prepare_for_promotion();
        self.promote_pinned_objects();
        self.blacken_stack_roots();
        self.walk_thread_locals();
        self.blacken_global_roots();
        self.scan_grey_objects(false);
        self.process_code_cache(false);
    }

    /// The incremental pass: the old generation's objects stay where they
    /// are (its from-half is moved wholesale into the to-half), and tracing
    /// starts from dirty cards in addition to the ordinary roots.
    pub fn scan_from_dirty_roots(&self) {
        let _scope = self.timers.scoped(GcPhase::ScanFromDirtyRoots);
        let heap = self.heap();
        heap.old().empty_from_into_to();
        heap.old().prepare_for_promotion();
        heap.young().prepare_for_promotion();
        self.promote_pinned_objects();
        self.blacken_dirty_card_roots();
        self.blacken_stack_roots();
        self.walk_thread_locals();
        self.blacken_global_roots();
        self.scan_grey_objects(true);
        self.process_code_cache(true);
    }

    /// Promote the chunk of every pinned object in place, so pinned bytes
    /// survive without moving. Pins on runtime-managed objects need no
    /// promotion; the claim walk still recycles their closed slots.
    fn promote_pinned_objects(&self) {
        let _scope = self.timers.scoped(GcPhase::PromotePinned);
        let heap = self.heap();
        self.pinned.claim_and_visit(&mut |obj| {
            if !heap.is_runtime_managed(obj) {
                heap.old().promote_object_chunk(obj);
            }
        });
    }

    fn blacken_stack_roots(&self) {
        let _scope = self.timers.scoped(GcPhase::BlackenStack);
        let walker = self.runtime.stack_walker();
        walker.walk_current_stack(&mut |frame| self.scan_frame(&frame));
        walker.walk_parked_stacks(&mut |frame| self.scan_frame(&frame));
    }

    fn scan_frame(&self, frame: &Frame) {
        let walker = self.runtime.stack_walker();
        match walker.resolve(frame) {
            // The frame's state lives in a snapshot object reached through
            // ordinary references; the frame itself holds nothing.
            FrameRefs::Deoptimized => {}
            FrameRefs::Compiled { dynamic } => {
                walker.walk_frame_slots(frame, &mut |slot| self.blacken_slot(slot));
                if dynamic && self.runtime.code_cache().is_enabled() {
                    // Code on a stack is live; while it runs, even its weak
                    // references must keep their referents alive.
                    walker.walk_code_slots(frame, RefStrength::Strong, &mut |slot| {
                        self.blacken_slot(slot)
                    });
                    walker.walk_code_slots(frame, RefStrength::Weak, &mut |slot| {
                        self.blacken_slot(slot)
                    });
                }
            }
        }
    }

    fn walk_thread_locals(&self) {
        let _scope = self.timers.scoped(GcPhase::WalkThreadLocals);
        self.runtime
            .stack_walker()
            .walk_thread_locals(&mut |slot| self.blacken_slot(slot));
    }

    fn blacken_global_roots(&self) {
        let _scope = self.timers.scoped(GcPhase::BlackenGlobals);
        self.runtime
            .stack_walker()
            .walk_global_roots(&mut |slot| self.blacken_slot(slot));
    }

    fn blacken_dirty_card_roots(&self) {
        let _scope = self.timers.scoped(GcPhase::BlackenDirtyCards);
        let heap = self.heap();
        heap.old()
            .walk_dirty_objects(&mut |obj| heap.walk_slots(obj, &mut |slot| self.blacken_slot(slot)));
    }

    /// Drive grey scanning to a fixpoint. An incremental pass greys objects
    /// in both generations; a complete pass copies every survivor into the
    /// old generation, so only it can hold grey objects.
    fn scan_grey_objects(&self, incremental: bool) {
        let _scope = self.timers.scoped(GcPhase::ScanGrey);
        let heap = self.heap();
        let mut visit = |obj| heap.walk_slots(obj, &mut |slot| self.blacken_slot(slot));
        if incremental {
            loop {
                let mut any = heap.young().scan_grey_objects(&mut visit);
                any |= heap.old().scan_grey_objects(&mut visit);
                if !any {
                    break;
                }
            }
        } else {
            while heap.old().scan_grey_objects(&mut visit) {}
        }
    }

    /// Walk installed code's references (which may grey further objects),
    /// absorb them, then invalidate code whose referents died.
    fn process_code_cache(&self, incremental: bool) {
        let code = self.runtime.code_cache();
        if !code.is_enabled() {
            return;
        }
        {
            let _scope = self.timers.scoped(GcPhase::WalkCodeCache);
            code.walk_code_roots(&mut |slot| self.blacken_slot(slot));
        }
        self.scan_grey_objects(incremental);
        let _scope = self.timers.scoped(GcPhase::SweepCodeCache);
        code.sweep_unreachable();
    }

    /// Visit one reference slot: null and already-black referents are left
    /// alone, white referents are copied (or their existing forwarding is
    /// followed) and the slot updated.
    fn blacken_slot(&self, slot: Address) {
        let heap = self.heap();
        let obj = match heap.read_slot(slot) {
            Some(obj) => obj,
            None => return,
        };
        if !heap.needs_promotion(obj) {
            return;
        }
        let forwarded = match heap.forwarding_of(obj) {
            Some(forwarded) => forwarded,
            None => heap.promote(obj),
        };
        if forwarded != obj {
            heap.write_slot(slot, forwarded);
        }
    }

    /// Hand unused chunk capacity back to the chunk allocator. The old
    /// generation only shrinks after a complete pass; an incremental pass
    /// leaves it untouched.
    pub fn release_spaces(&self, complete: bool) {
        self.heap().young().release_unused();
        if complete {
            self.heap().old().release_unused();
        }
    }

    /// Flip from/to roles in both generations, re-establishing the
    /// empty-to-half invariant for the next cycle.
    pub fn swap_spaces(&self) {
        self.heap().young().swap_spaces();
        self.heap().old().swap_spaces();
    }
}

#[cfg(test)]
mod tests {
    use crate::collect::GcCause;
    use crate::util::options::Options;
    use crate::util::options::PolicySelector;
    use crate::util::test_util::mock_runtime::mock_gc;
    use crate::util::test_util::mock_runtime::MockGen;

    fn complete_only_options() -> Options {
        let mut options = Options::default();
        options.policy = PolicySelector::OnlyCompletely;
        options
    }

    #[test]
    fn compiled_frame_slots_are_roots() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        let obj = heap.add_young(&[None]);
        let slot = heap.add_root_slot(Some(obj));
        runtime.stack_walker.add_compiled_frame(vec![slot]);

        gc.request_collection(GcCause::UserRequested).unwrap();

        let copy = crate::runtime::Heap::read_slot(heap, slot).unwrap();
        assert_eq!(heap.generation_of(copy), Some(MockGen::Old));
    }

    #[test]
    fn deoptimized_frame_slots_are_not_walked() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        let obj = heap.add_young(&[None]);
        let stale_slot = heap.add_root_slot(Some(obj));
        runtime.stack_walker.add_deoptimized_frame(vec![stale_slot]);

        gc.request_collection(GcCause::UserRequested).unwrap();

        // The frame's state lives in its snapshot object; the stale slot is
        // not a root, so the referent dies.
        assert!(!heap.contains(obj));
    }

    #[test]
    fn dynamic_frame_keeps_its_code_references_alive() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        runtime.code_cache.set_enabled(true);
        let strong_ref = heap.add_young(&[None]);
        let weak_ref = heap.add_young(&[None]);
        let strong_slot = heap.add_root_slot(Some(strong_ref));
        let weak_slot = heap.add_root_slot(Some(weak_ref));
        runtime
            .stack_walker
            .add_dynamic_frame(vec![], vec![strong_slot], vec![weak_slot]);

        gc.request_collection(GcCause::UserRequested).unwrap();

        // On-stack code holds all of its references strongly, weak included.
        let strong_copy = crate::runtime::Heap::read_slot(heap, strong_slot).unwrap();
        let weak_copy = crate::runtime::Heap::read_slot(heap, weak_slot).unwrap();
        assert_eq!(heap.generation_of(strong_copy), Some(MockGen::Old));
        assert_eq!(heap.generation_of(weak_copy), Some(MockGen::Old));
    }

    #[test]
    fn enabled_code_cache_is_walked_and_swept() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        runtime.code_cache.set_enabled(true);
        let held = heap.add_young(&[None]);
        let code_slot = heap.add_root_slot(Some(held));
        runtime.code_cache.add_code_root(code_slot);

        gc.request_collection(GcCause::UserRequested).unwrap();

        let copy = crate::runtime::Heap::read_slot(heap, code_slot).unwrap();
        assert_eq!(heap.generation_of(copy), Some(MockGen::Old));
        assert_eq!(runtime.code_cache.sweep_count(), 1);
    }

    #[test]
    fn disabled_code_cache_is_ignored() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        let held = heap.add_young(&[None]);
        let code_slot = heap.add_root_slot(Some(held));
        runtime.code_cache.add_code_root(code_slot);

        gc.request_collection(GcCause::UserRequested).unwrap();

        assert_eq!(runtime.code_cache.sweep_count(), 0);
        assert!(!heap.contains(held));
    }

    #[test]
    fn thread_local_and_global_roots_are_walked() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        let tl = heap.add_young(&[None]);
        let global = heap.add_young(&[None]);
        let tl_slot = heap.add_root_slot(Some(tl));
        let global_slot = heap.add_root_slot(Some(global));
        runtime.stack_walker.add_thread_local_root(tl_slot);
        runtime.stack_walker.add_global_root(global_slot);

        gc.request_collection(GcCause::UserRequested).unwrap();

        assert!(crate::runtime::Heap::read_slot(heap, tl_slot).is_some());
        assert!(crate::runtime::Heap::read_slot(heap, global_slot).is_some());
    }

    #[test]
    fn runtime_managed_referents_are_left_alone() {
        let gc = mock_gc(complete_only_options());
        let runtime = gc.runtime();
        let heap = &runtime.heap;
        let managed = heap.add_managed(&[None]);
        let holder = heap.add_young(&[Some(managed)]);
        let root = heap.add_root_slot(Some(holder));
        runtime.stack_walker.add_global_root(root);

        gc.request_collection(GcCause::UserRequested).unwrap();

        let holder_copy = crate::runtime::Heap::read_slot(heap, root).unwrap();
        let managed_slot = heap.slot_address(holder_copy, 0);
        // The slot still points at the managed object itself, not a copy.
        assert_eq!(
            crate::runtime::Heap::read_slot(heap, managed_slot),
            Some(managed)
        );
    }
}
