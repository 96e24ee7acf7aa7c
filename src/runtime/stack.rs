use crate::util::address::Address;

/// One frame of a managed stack, as enumerated by the runtime's stack
/// walker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub stack_pointer: Address,
    pub instruction_pointer: Address,
}

/// How a frame's references are found.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameRefs {
    /// A normal compiled-code frame with reference-map metadata. `dynamic`
    /// is true for dynamically-installed (runtime-compiled) code, as opposed
    /// to build-time code.
    Compiled { dynamic: bool },
    /// A frame invalidated by on-stack replacement and materialized into a
    /// snapshot object. The snapshot is an ordinary reachable heap object,
    /// so the frame itself carries no references to walk.
    Deoptimized,
}

/// The strength with which installed code holds a reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RefStrength {
    Strong,
    Weak,
}

/// Stack walking and code-reference-map decoding.
///
/// All walks happen inside the cycle body, with every mutator parked, so
/// implementations may read frame anchors without synchronization.
pub trait StackWalker: 'static + Send + Sync {
    /// Enumerate the frames of the calling thread's stack.
    fn walk_current_stack(&self, f: &mut dyn FnMut(Frame));

    /// Enumerate the frames of every other attached thread, each parked at
    /// the safepoint with a valid frame anchor.
    fn walk_parked_stacks(&self, f: &mut dyn FnMut(Frame));

    /// Resolve how `frame`'s references are found.
    fn resolve(&self, frame: &Frame) -> FrameRefs;

    /// Enumerate the reference slots of a compiled frame, via its
    /// reference-map metadata. Must not be called for deoptimized frames.
    fn walk_frame_slots(&self, frame: &Frame, f: &mut dyn FnMut(Address));

    /// Enumerate the reference slots held by the installed code a frame is
    /// executing, filtered by `strength`. While such code is on a stack all
    /// of its references count as strong, so the tracer walks both
    /// strengths.
    fn walk_code_slots(&self, frame: &Frame, strength: RefStrength, f: &mut dyn FnMut(Address));

    /// Enumerate custom thread-local root regions that contain references.
    fn walk_thread_locals(&self, f: &mut dyn FnMut(Address));

    /// Enumerate the reference slots of writable global/image roots.
    fn walk_global_roots(&self, f: &mut dyn FnMut(Address));
}
