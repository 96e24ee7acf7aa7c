//! Contracts of the external collaborators the collection engine consumes.
//!
//! The engine owns the cycle orchestration, the tracing/copying algorithm,
//! accounting, timing and the watcher registry. Everything else — the chunked
//! space allocator, the card-marking remembered set, stack walking and
//! code-reference-map decoding, reference-queue processing, and the safepoint
//! substrate that parks mutator threads — belongs to the embedding runtime
//! and is reached only through the narrow traits in this module.
//!
//! A runtime embeds the engine by implementing [`Runtime`] and handing an
//! instance to [`GenGC::new`](crate::GenGC::new).

mod code;
mod heap;
mod refs;
mod safepoint;
mod stack;

pub use self::code::CodeCache;
pub use self::heap::Generation;
pub use self::heap::Heap;
pub use self::heap::OldGeneration;
pub use self::heap::YoungGeneration;
pub use self::refs::RefProcessing;
pub use self::refs::SoftRefPolicy;
pub use self::safepoint::Safepoint;
pub use self::stack::Frame;
pub use self::stack::FrameRefs;
pub use self::stack::RefStrength;
pub use self::stack::StackWalker;

use crate::collect::Epoch;
use crate::collect::GcCause;

/// The umbrella trait tying the collaborator contracts together. One
/// implementation per embedding runtime.
pub trait Runtime: 'static + Sized + Send + Sync {
    /// The heap: generations, spaces, and object-graph access.
    type Heap: Heap;
    /// The safepoint substrate that parks mutators and serializes operations.
    type Safepoint: Safepoint;
    /// The stack walker and code-reference-map decoder.
    type StackWalker: StackWalker;
    /// The installed-code cache, if the runtime compiles code at run time.
    type CodeCache: CodeCache;
    /// Weak/soft/finalizer reference-queue processing.
    type RefProcessing: RefProcessing;

    fn heap(&self) -> &Self::Heap;
    fn safepoint(&self) -> &Self::Safepoint;
    fn stack_walker(&self) -> &Self::StackWalker;
    fn code_cache(&self) -> &Self::CodeCache;
    fn ref_processing(&self) -> &Self::RefProcessing;

    /// Optional heap-verification hook, run immediately before the traced
    /// region of a cycle. The default does nothing.
    fn verify_before(&self, _cause: GcCause, _epoch: Epoch) {}

    /// Optional heap-verification hook, run immediately after the traced
    /// region of a cycle. The default does nothing.
    fn verify_after(&self, _cause: GcCause, _epoch: Epoch) {}
}
