//! A mock embedding runtime. The heap is a table of fake objects with
//! explicit slot lists; promotion copies table entries around, so tests can
//! drive whole collection cycles and inspect what survived where.
//!
//! Simplifications relative to a real runtime: every copied survivor lands
//! in the old generation (the mock has no age cohorts, so the young
//! generation never holds grey objects and reports zero survivor bytes),
//! and `park_and_run` runs its body directly on the calling thread.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use crate::runtime::CodeCache;
use crate::runtime::Frame;
use crate::runtime::FrameRefs;
use crate::runtime::Generation;
use crate::runtime::Heap;
use crate::runtime::OldGeneration;
use crate::runtime::RefProcessing;
use crate::runtime::RefStrength;
use crate::runtime::Runtime;
use crate::runtime::Safepoint;
use crate::runtime::SoftRefPolicy;
use crate::runtime::StackWalker;
use crate::runtime::YoungGeneration;
use crate::util::address::Address;
use crate::util::address::ByteSize;
use crate::util::address::ObjectReference;

const WORD: ByteSize = 8;
const DEFAULT_OBJECT_BYTES: ByteSize = 64;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockGen {
    Young,
    Old,
    /// Runtime-managed (image) memory; never collected, never moved.
    Managed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Half {
    From,
    To,
}

struct ObjInfo {
    gen: MockGen,
    half: Half,
    size: ByteSize,
    slots: Vec<Address>,
    chunk: u32,
}

#[derive(Default)]
struct HeapState {
    objects: HashMap<ObjectReference, ObjInfo>,
    slot_values: HashMap<Address, Option<ObjectReference>>,
    forwarding: HashMap<ObjectReference, ObjectReference>,
    /// Grey copies awaiting a slot walk. All copies land in the old
    /// generation, so one list suffices.
    grey: Vec<ObjectReference>,
    dirty: Vec<ObjectReference>,
    next_addr: usize,
    next_chunk: u32,
    flushes: usize,
    young_releases: usize,
    old_releases: usize,
}

impl HeapState {
    fn bump(&mut self, bytes: usize) -> usize {
        if self.next_addr == 0 {
            self.next_addr = 0x10_0000;
        }
        let addr = self.next_addr;
        // Keep allocations chunk-aligned-ish so addresses stay readable in
        // failure output.
        self.next_addr += bytes.max(WORD).next_power_of_two().max(0x100);
        addr
    }

    fn insert_object(
        &mut self,
        gen: MockGen,
        size: ByteSize,
        referents: &[Option<ObjectReference>],
    ) -> ObjectReference {
        let addr = self.bump(size);
        let obj = ObjectReference::from_raw_address(Address::from_usize(addr))
            .expect("bump allocator returned the zero address");
        let slots: Vec<Address> = (0..referents.len())
            .map(|i| Address::from_usize(addr) + i * WORD)
            .collect();
        for (slot, value) in slots.iter().zip(referents) {
            self.slot_values.insert(*slot, *value);
        }
        let chunk = self.next_chunk;
        self.next_chunk += 1;
        self.objects.insert(
            obj,
            ObjInfo {
                gen,
                half: Half::From,
                size,
                slots,
                chunk,
            },
        );
        obj
    }

    fn sum_bytes(&self, gen: MockGen) -> ByteSize {
        self.objects
            .values()
            .filter(|info| info.gen == gen)
            .map(|info| info.size)
            .sum()
    }

    fn to_space_is_empty(&self, gen: MockGen) -> bool {
        !self
            .objects
            .values()
            .any(|info| info.gen == gen && info.half == Half::To)
    }

    /// Delete every from-half object of `gen` (survivors were copied or had
    /// their half relabeled) and flip the to-half back to from.
    fn swap(&mut self, gen: MockGen) {
        let dead: Vec<ObjectReference> = self
            .objects
            .iter()
            .filter(|(_, info)| info.gen == gen && info.half == Half::From)
            .map(|(obj, _)| *obj)
            .collect();
        for obj in dead {
            if let Some(info) = self.objects.remove(&obj) {
                for slot in info.slots {
                    self.slot_values.remove(&slot);
                }
            }
            self.forwarding.remove(&obj);
        }
        for info in self.objects.values_mut() {
            if info.gen == gen && info.half == Half::To {
                info.half = Half::From;
            }
        }
    }
}

pub struct MockHeap {
    state: Arc<Mutex<HeapState>>,
    young: MockYoungGen,
    old: MockOldGen,
}

impl Default for MockHeap {
    fn default() -> Self {
        let state = Arc::new(Mutex::new(HeapState::default()));
        MockHeap {
            young: MockYoungGen {
                state: state.clone(),
            },
            old: MockOldGen {
                state: state.clone(),
            },
            state,
        }
    }
}

impl MockHeap {
    pub fn add_young(&self, referents: &[Option<ObjectReference>]) -> ObjectReference {
        self.add_object(MockGen::Young, DEFAULT_OBJECT_BYTES, referents)
    }

    pub fn add_old(&self, referents: &[Option<ObjectReference>]) -> ObjectReference {
        self.add_object(MockGen::Old, DEFAULT_OBJECT_BYTES, referents)
    }

    pub fn add_managed(&self, referents: &[Option<ObjectReference>]) -> ObjectReference {
        self.add_object(MockGen::Managed, DEFAULT_OBJECT_BYTES, referents)
    }

    pub fn add_object(
        &self,
        gen: MockGen,
        size: ByteSize,
        referents: &[Option<ObjectReference>],
    ) -> ObjectReference {
        self.state.lock().unwrap().insert_object(gen, size, referents)
    }

    /// Allocate a bare reference slot outside any object, for use as a
    /// stack, thread-local or global root.
    pub fn add_root_slot(&self, value: Option<ObjectReference>) -> Address {
        let mut state = self.state.lock().unwrap();
        let slot = Address::from_usize(state.bump(WORD));
        state.slot_values.insert(slot, value);
        slot
    }

    /// Put `b` into `a`'s chunk, so chunk promotion carries both.
    pub fn place_in_same_chunk(&self, a: ObjectReference, b: ObjectReference) {
        let mut state = self.state.lock().unwrap();
        let chunk = state.objects[&a].chunk;
        state.objects.get_mut(&b).unwrap().chunk = chunk;
    }

    /// Mark `obj`'s card dirty, as a mutator write barrier would.
    pub fn mark_dirty(&self, obj: ObjectReference) {
        self.state.lock().unwrap().dirty.push(obj);
    }

    pub fn contains(&self, obj: ObjectReference) -> bool {
        self.state.lock().unwrap().objects.contains_key(&obj)
    }

    pub fn generation_of(&self, obj: ObjectReference) -> Option<MockGen> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&obj)
            .map(|info| info.gen)
    }

    /// The address of `obj`'s `index`-th reference slot.
    pub fn slot_address(&self, obj: ObjectReference, index: usize) -> Address {
        self.state.lock().unwrap().objects[&obj].slots[index]
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().unwrap().flushes
    }

    pub fn release_counts(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.young_releases, state.old_releases)
    }
}

impl Heap for MockHeap {
    type Young = MockYoungGen;
    type Old = MockOldGen;

    fn young(&self) -> &MockYoungGen {
        &self.young
    }

    fn old(&self) -> &MockOldGen {
        &self.old
    }

    fn flush_thread_local_allocation(&self) {
        self.state.lock().unwrap().flushes += 1;
    }

    fn read_slot(&self, slot: Address) -> Option<ObjectReference> {
        self.state
            .lock()
            .unwrap()
            .slot_values
            .get(&slot)
            .copied()
            .flatten()
    }

    fn write_slot(&self, slot: Address, value: ObjectReference) {
        self.state
            .lock()
            .unwrap()
            .slot_values
            .insert(slot, Some(value));
    }

    fn needs_promotion(&self, obj: ObjectReference) -> bool {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&obj)
            .map(|info| info.gen != MockGen::Managed && info.half == Half::From)
            .unwrap_or(false)
    }

    fn forwarding_of(&self, obj: ObjectReference) -> Option<ObjectReference> {
        self.state.lock().unwrap().forwarding.get(&obj).copied()
    }

    fn promote(&self, obj: ObjectReference) -> ObjectReference {
        let mut state = self.state.lock().unwrap();
        debug_assert!(!state.forwarding.contains_key(&obj));
        let (size, old_slots) = {
            let info = &state.objects[&obj];
            debug_assert!(info.half == Half::From);
            (info.size, info.slots.clone())
        };
        let values: Vec<Option<ObjectReference>> = old_slots
            .iter()
            .map(|slot| state.slot_values[slot])
            .collect();
        let copy = state.insert_object(MockGen::Old, size, &values);
        state.objects.get_mut(&copy).unwrap().half = Half::To;
        state.forwarding.insert(obj, copy);
        state.grey.push(copy);
        copy
    }

    fn walk_slots(&self, obj: ObjectReference, f: &mut dyn FnMut(Address)) {
        let slots = {
            let state = self.state.lock().unwrap();
            match state.objects.get(&obj) {
                Some(info) => info.slots.clone(),
                None => return,
            }
        };
        for slot in slots {
            f(slot);
        }
    }

    fn is_runtime_managed(&self, obj: ObjectReference) -> bool {
        self.generation_of(obj) == Some(MockGen::Managed)
    }
}

pub struct MockYoungGen {
    state: Arc<Mutex<HeapState>>,
}

impl Generation for MockYoungGen {
    fn used_chunk_bytes(&self) -> ByteSize {
        self.state.lock().unwrap().sum_bytes(MockGen::Young)
    }

    fn used_object_bytes(&self) -> ByteSize {
        self.used_chunk_bytes()
    }

    fn to_space_is_empty(&self) -> bool {
        self.state.lock().unwrap().to_space_is_empty(MockGen::Young)
    }

    fn prepare_for_promotion(&self) {}

    fn scan_grey_objects(&self, _visit: &mut dyn FnMut(ObjectReference)) -> bool {
        // Copies always land in the old generation.
        false
    }

    fn release_unused(&self) {
        self.state.lock().unwrap().young_releases += 1;
    }

    fn swap_spaces(&self) {
        self.state.lock().unwrap().swap(MockGen::Young);
    }
}

impl YoungGeneration for MockYoungGen {
    fn survivor_chunk_bytes(&self) -> ByteSize {
        0
    }
}

pub struct MockOldGen {
    state: Arc<Mutex<HeapState>>,
}

impl Generation for MockOldGen {
    fn used_chunk_bytes(&self) -> ByteSize {
        self.state.lock().unwrap().sum_bytes(MockGen::Old)
    }

    fn used_object_bytes(&self) -> ByteSize {
        self.used_chunk_bytes()
    }

    fn to_space_is_empty(&self) -> bool {
        self.state.lock().unwrap().to_space_is_empty(MockGen::Old)
    }

    fn prepare_for_promotion(&self) {}

    fn scan_grey_objects(&self, visit: &mut dyn FnMut(ObjectReference)) -> bool {
        let batch: Vec<ObjectReference> =
            std::mem::take(&mut self.state.lock().unwrap().grey);
        for obj in &batch {
            visit(*obj);
        }
        !batch.is_empty()
    }

    fn release_unused(&self) {
        self.state.lock().unwrap().old_releases += 1;
    }

    fn swap_spaces(&self) {
        self.state.lock().unwrap().swap(MockGen::Old);
    }
}

impl OldGeneration for MockOldGen {
    fn empty_from_into_to(&self) {
        let mut state = self.state.lock().unwrap();
        for info in state.objects.values_mut() {
            if info.gen == MockGen::Old && info.half == Half::From {
                info.half = Half::To;
            }
        }
    }

    fn walk_dirty_objects(&self, visit: &mut dyn FnMut(ObjectReference)) {
        let dirty: Vec<ObjectReference> =
            std::mem::take(&mut self.state.lock().unwrap().dirty);
        for obj in dirty {
            let live = self
                .state
                .lock()
                .unwrap()
                .objects
                .get(&obj)
                .map(|info| info.gen == MockGen::Old)
                .unwrap_or(false);
            if live {
                visit(obj);
            }
        }
    }

    fn promote_object_chunk(&self, obj: ObjectReference) {
        let mut state = self.state.lock().unwrap();
        let chunk = match state.objects.get(&obj) {
            Some(info) => info.chunk,
            None => return,
        };
        let mates: Vec<ObjectReference> = state
            .objects
            .iter()
            .filter(|(_, info)| {
                info.chunk == chunk && info.gen != MockGen::Managed && info.half == Half::From
            })
            .map(|(o, _)| *o)
            .collect();
        for mate in mates {
            if let Some(info) = state.objects.get_mut(&mate) {
                info.gen = MockGen::Old;
                info.half = Half::To;
            }
            state.grey.push(mate);
        }
    }
}

type ParkHook = Box<dyn Fn() + Send + Sync>;

/// Runs everything on the calling thread; there are no real mutators to
/// park. A one-shot `on_park` hook runs after "parking" but before the
/// has-work check, which is how tests interleave a competing request.
#[derive(Default)]
pub struct MockSafepoint {
    on_park: Mutex<Option<ParkHook>>,
    in_operation: AtomicBool,
    detached: AtomicBool,
    parks: AtomicUsize,
    skipped: AtomicUsize,
    serialized_runs: AtomicUsize,
}

impl MockSafepoint {
    pub fn set_on_park(&self, hook: ParkHook) {
        *self.on_park.lock().unwrap() = Some(hook);
    }

    pub fn set_in_operation(&self, value: bool) {
        self.in_operation.store(value, Ordering::SeqCst);
    }

    pub fn set_thread_attached(&self, value: bool) {
        self.detached.store(!value, Ordering::SeqCst);
    }

    pub fn park_count(&self) -> usize {
        self.parks.load(Ordering::SeqCst)
    }

    /// How many parked requests found their work already done.
    pub fn skipped_count(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn serialized_run_count(&self) -> usize {
        self.serialized_runs.load(Ordering::SeqCst)
    }
}

impl Safepoint for MockSafepoint {
    fn park_and_run(&self, has_work: &dyn Fn() -> bool, body: &mut dyn FnMut() -> bool) -> bool {
        self.parks.fetch_add(1, Ordering::SeqCst);
        let hook = self.on_park.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        if !has_work() {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return false;
        }
        body()
    }

    fn run_serialized(&self, body: &mut dyn FnMut()) {
        self.serialized_runs.fetch_add(1, Ordering::SeqCst);
        body();
    }

    fn in_operation(&self) -> bool {
        self.in_operation.load(Ordering::SeqCst)
    }

    fn thread_attached(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }
}

struct MockFrame {
    frame: Frame,
    refs: FrameRefs,
    slots: Vec<Address>,
    strong_code_slots: Vec<Address>,
    weak_code_slots: Vec<Address>,
}

#[derive(Default)]
struct WalkerState {
    frames: Vec<MockFrame>,
    thread_locals: Vec<Address>,
    globals: Vec<Address>,
    next_sp: usize,
}

#[derive(Default)]
pub struct MockStackWalker {
    state: Mutex<WalkerState>,
}

impl MockStackWalker {
    fn add_frame(
        &self,
        refs: FrameRefs,
        slots: Vec<Address>,
        strong_code_slots: Vec<Address>,
        weak_code_slots: Vec<Address>,
    ) -> Frame {
        let mut state = self.state.lock().unwrap();
        state.next_sp += 0x1000;
        let frame = Frame {
            stack_pointer: Address::from_usize(0x7000_0000 + state.next_sp),
            instruction_pointer: Address::from_usize(0x4000_0000 + state.next_sp),
        };
        state.frames.push(MockFrame {
            frame,
            refs,
            slots,
            strong_code_slots,
            weak_code_slots,
        });
        frame
    }

    pub fn add_compiled_frame(&self, slots: Vec<Address>) -> Frame {
        self.add_frame(FrameRefs::Compiled { dynamic: false }, slots, vec![], vec![])
    }

    pub fn add_dynamic_frame(
        &self,
        slots: Vec<Address>,
        strong_code_slots: Vec<Address>,
        weak_code_slots: Vec<Address>,
    ) -> Frame {
        self.add_frame(
            FrameRefs::Compiled { dynamic: true },
            slots,
            strong_code_slots,
            weak_code_slots,
        )
    }

    /// A deoptimized frame. `slots` would be the frame's stale reference
    /// map; the tracer must never walk them.
    pub fn add_deoptimized_frame(&self, slots: Vec<Address>) -> Frame {
        self.add_frame(FrameRefs::Deoptimized, slots, vec![], vec![])
    }

    pub fn add_thread_local_root(&self, slot: Address) {
        self.state.lock().unwrap().thread_locals.push(slot);
    }

    pub fn add_global_root(&self, slot: Address) {
        self.state.lock().unwrap().globals.push(slot);
    }
}

impl StackWalker for MockStackWalker {
    fn walk_current_stack(&self, f: &mut dyn FnMut(Frame)) {
        let frames: Vec<Frame> = {
            let state = self.state.lock().unwrap();
            state.frames.iter().map(|m| m.frame).collect()
        };
        for frame in frames {
            f(frame);
        }
    }

    fn walk_parked_stacks(&self, _f: &mut dyn FnMut(Frame)) {
        // The mock has a single thread; its frames are the current stack.
    }

    fn resolve(&self, frame: &Frame) -> FrameRefs {
        self.state
            .lock()
            .unwrap()
            .frames
            .iter()
            .find(|m| m.frame == *frame)
            .map(|m| m.refs)
            .expect("resolving a frame the mock never produced")
    }

    fn walk_frame_slots(&self, frame: &Frame, f: &mut dyn FnMut(Address)) {
        let slots: Vec<Address> = {
            let state = self.state.lock().unwrap();
            let mock = state
                .frames
                .iter()
                .find(|m| m.frame == *frame)
                .expect("walking a frame the mock never produced");
            assert!(
                mock.refs != FrameRefs::Deoptimized,
                "walked the slots of a deoptimized frame"
            );
            mock.slots.clone()
        };
        for slot in slots {
            f(slot);
        }
    }

    fn walk_code_slots(&self, frame: &Frame, strength: RefStrength, f: &mut dyn FnMut(Address)) {
        let slots: Vec<Address> = {
            let state = self.state.lock().unwrap();
            let mock = state
                .frames
                .iter()
                .find(|m| m.frame == *frame)
                .expect("walking a frame the mock never produced");
            match strength {
                RefStrength::Strong => mock.strong_code_slots.clone(),
                RefStrength::Weak => mock.weak_code_slots.clone(),
            }
        };
        for slot in slots {
            f(slot);
        }
    }

    fn walk_thread_locals(&self, f: &mut dyn FnMut(Address)) {
        let slots = self.state.lock().unwrap().thread_locals.clone();
        for slot in slots {
            f(slot);
        }
    }

    fn walk_global_roots(&self, f: &mut dyn FnMut(Address)) {
        let slots = self.state.lock().unwrap().globals.clone();
        for slot in slots {
            f(slot);
        }
    }
}

#[derive(Default)]
pub struct MockCodeCache {
    enabled: AtomicBool,
    roots: Mutex<Vec<Address>>,
    sweeps: AtomicUsize,
}

impl MockCodeCache {
    pub fn set_enabled(&self, value: bool) {
        self.enabled.store(value, Ordering::SeqCst);
    }

    pub fn add_code_root(&self, slot: Address) {
        self.roots.lock().unwrap().push(slot);
    }

    pub fn sweep_count(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

impl CodeCache for MockCodeCache {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn walk_code_roots(&self, f: &mut dyn FnMut(Address)) {
        let slots = self.roots.lock().unwrap().clone();
        for slot in slots {
            f(slot);
        }
    }

    fn sweep_unreachable(&self) {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockRefProcessing {
    batches: AtomicU32,
    processed: Mutex<Vec<SoftRefPolicy>>,
    enqueued: Mutex<Vec<u32>>,
    drains: AtomicUsize,
    after_calls: Mutex<Vec<(ByteSize, ByteSize)>>,
}

impl MockRefProcessing {
    pub fn processed_policies(&self) -> Vec<SoftRefPolicy> {
        self.processed.lock().unwrap().clone()
    }

    pub fn enqueued_batches(&self) -> Vec<u32> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    pub fn after_collection_calls(&self) -> Vec<(ByteSize, ByteSize)> {
        self.after_calls.lock().unwrap().clone()
    }
}

impl RefProcessing for MockRefProcessing {
    type Pending = u32;

    fn process_discovered(&self, soft: SoftRefPolicy) -> u32 {
        self.processed.lock().unwrap().push(soft);
        self.batches.fetch_add(1, Ordering::SeqCst)
    }

    fn enqueue_pending(&self, pending: u32) {
        self.enqueued.lock().unwrap().push(pending);
    }

    fn drain_pending(&self) {
        self.drains.fetch_add(1, Ordering::SeqCst);
    }

    fn after_collection(&self, used_bytes: ByteSize, max_bytes: ByteSize) {
        self.after_calls.lock().unwrap().push((used_bytes, max_bytes));
    }
}

#[derive(Default)]
pub struct MockRuntime {
    pub heap: MockHeap,
    pub safepoint: MockSafepoint,
    pub stack_walker: MockStackWalker,
    pub code_cache: MockCodeCache,
    pub ref_processing: MockRefProcessing,
    pub verify_before_calls: AtomicUsize,
    pub verify_after_calls: AtomicUsize,
}

impl Runtime for MockRuntime {
    type Heap = MockHeap;
    type Safepoint = MockSafepoint;
    type StackWalker = MockStackWalker;
    type CodeCache = MockCodeCache;
    type RefProcessing = MockRefProcessing;

    fn heap(&self) -> &MockHeap {
        &self.heap
    }

    fn safepoint(&self) -> &MockSafepoint {
        &self.safepoint
    }

    fn stack_walker(&self) -> &MockStackWalker {
        &self.stack_walker
    }

    fn code_cache(&self) -> &MockCodeCache {
        &self.code_cache
    }

    fn ref_processing(&self) -> &MockRefProcessing {
        &self.ref_processing
    }

    fn verify_before(&self, _cause: crate::collect::GcCause, _epoch: crate::collect::Epoch) {
        self.verify_before_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn verify_after(&self, _cause: crate::collect::GcCause, _epoch: crate::collect::Epoch) {
        self.verify_after_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// A fresh engine over a fresh mock runtime.
pub fn mock_gc(options: crate::util::options::Options) -> crate::GenGC<MockRuntime> {
    crate::GenGC::new(Arc::new(MockRuntime::default()), options)
}
