use crate::util::address::ByteSize;

/// How softly-reachable referents are treated during a trace. Normally they
/// are kept alive; on the out-of-memory retry the engine threads
/// `TreatAsWeak` through the trace so soft references can be reclaimed.
/// Because the policy is a parameter rather than ambient state, there is
/// nothing to restore when the retry returns.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SoftRefPolicy {
    Normal,
    TreatAsWeak,
}

/// Weak/soft/finalizer reference-queue processing.
pub trait RefProcessing: 'static + Send + Sync {
    /// A batch of references that became pending during one trace. Opaque to
    /// the engine.
    type Pending;

    /// Process the references discovered during the trace that just
    /// finished, clearing referents that did not survive, and return the
    /// newly-pending batch. Runs inside the cycle body.
    fn process_discovered(&self, soft: SoftRefPolicy) -> Self::Pending;

    /// Append a batch to the runtime's pending-reference queue. The queue is
    /// drained later, on the requesting thread, not inside the cycle.
    fn enqueue_pending(&self, pending: Self::Pending);

    /// Drain the pending-reference queue: enqueue references for their
    /// reference handlers and invoke internal cleaners. Runs in the
    /// collection epilogue, outside the cycle and outside the latch.
    fn drain_pending(&self);

    /// Post-cycle notification with the used and maximum heap bytes, letting
    /// the reference subsystem adapt its soft-reference clock.
    fn after_collection(&self, used_bytes: ByteSize, max_bytes: ByteSize);
}
