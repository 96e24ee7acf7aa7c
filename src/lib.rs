//! A generational, copying garbage-collection engine for managed runtimes.
//!
//! The engine owns what is common to any embedding: cycle orchestration and
//! request coalescing, the Cheney tracing/copying passes (incremental
//! dirty-card and complete), byte accounting with a bounded history, phase
//! timers, the collection-watcher registry, and pinned-object bookkeeping.
//! Everything runtime-specific — chunked spaces, card marking, stack walking,
//! reference queues, and the safepoint substrate that parks mutators — is
//! reached through the traits in [`runtime`].
//!
//! An embedder implements [`runtime::Runtime`], builds a [`GenGC`] with its
//! [`util::options::Options`], and calls [`GenGC::request_collection`] (or
//! the free functions in [`memory_manager`]) when the runtime wants a
//! collection. Cycles run with all mutators parked; requests racing against
//! a running cycle coalesce into it.

#[macro_use]
extern crate log;

mod gengc;

pub mod collect;
pub mod memory_manager;
pub mod runtime;
pub mod util;

pub use crate::collect::AlreadyRegistered;
pub use crate::collect::Epoch;
pub use crate::collect::GcCause;
pub use crate::collect::GcError;
pub use crate::gengc::GenGC;
