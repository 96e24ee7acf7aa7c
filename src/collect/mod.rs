//! The collection engine: cycle orchestration, tracing, accounting, phase
//! timing, watchers, and pinned-object bookkeeping.

pub mod accounting;
pub mod controller;
pub mod pinned;
pub mod policy;
pub mod timers;
pub mod tracer;
pub mod watcher;

use std::fmt;

use strum_macros::IntoStaticStr;

/// Identifies one executed collection cycle. The counter increments exactly
/// once per physical cycle; a request captured at epoch *e* is satisfied
/// once the counter has advanced past *e*, which is how concurrent requests
/// coalesce.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub const ZERO: Epoch = Epoch(0);

    /// The epoch following this one.
    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) const fn from_u64(raw: u64) -> Epoch {
        Epoch(raw)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a collection was requested.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum GcCause {
    /// The application asked for a collection.
    UserRequested,
    /// An allocation could not be satisfied from the current spaces.
    AllocationFailure,
    /// Internal heuristics (e.g. a stress test or diagnostic harness).
    Diagnostic,
}

impl GcCause {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Fatal collection failures surfaced to the requesting thread.
///
/// Variants carry no payload so the value is ready before anything goes
/// wrong: surfacing an error never allocates, which matters most for
/// `OutOfMemory`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcError {
    /// The old generation was still over its byte budget after a forced
    /// complete-only retry with soft references treated as weak. Fatal for
    /// the requester, not for the runtime.
    OutOfMemory,
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::OutOfMemory => f.write_str("garbage-collected heap size exceeded"),
        }
    }
}

impl std::error::Error for GcError {}

/// A collection watcher was registered while its "has been listed" flag was
/// already set. Watchers are single-use; this is surfaced to the registering
/// caller and nothing else is affected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AlreadyRegistered;

impl fmt::Display for AlreadyRegistered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("attempting to reuse a previously-registered collection watcher")
    }
}

impl std::error::Error for AlreadyRegistered {}
