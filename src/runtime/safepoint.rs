/// The safepoint substrate. It is the only collaborator that can stop the
/// world: the engine hands it the cycle body and relies on it to run that
/// body on exactly one thread while every mutator is parked.
pub trait Safepoint: 'static + Send + Sync {
    /// Run `body` with all mutator threads parked at a safepoint. Blocks the
    /// calling thread until the operation completes.
    ///
    /// `has_work` is consulted once the safepoint is reached: if it returns
    /// false (another request's cycle already ran), `body` is skipped and
    /// this returns false. This is how duplicate requests captured at the
    /// same epoch coalesce into one physical cycle.
    ///
    /// Returns `body`'s result: whether the cycle reported an out-of-memory
    /// condition.
    fn park_and_run(&self, has_work: &dyn Fn() -> bool, body: &mut dyn FnMut() -> bool) -> bool;

    /// Run `body` serialized against other serialized operations, without
    /// parking mutators. Used for the watcher report phase, which must not
    /// take the collection latch.
    fn run_serialized(&self, body: &mut dyn FnMut());

    /// Whether the calling thread is currently inside a safepoint-coordinated
    /// operation. The collection epilogue refuses to synchronize from inside
    /// one (it could deadlock on a lock held outside the operation).
    fn in_operation(&self) -> bool;

    /// Whether the calling thread has completed its attach sequence. Too
    /// early in the sequence it is not yet safe to synchronize, so the
    /// epilogue is skipped.
    fn thread_attached(&self) -> bool;
}
