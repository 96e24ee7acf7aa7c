use crate::util::address::Address;

/// The cache of dynamically-installed compiled code. Only relevant when the
/// runtime supports deoptimization of managed code; runtimes that compile
/// everything at build time implement [`is_enabled`] as `false` and the rest
/// as no-ops.
///
/// [`is_enabled`]: CodeCache::is_enabled
pub trait CodeCache: 'static + Send + Sync {
    /// Whether deoptimization support is active, i.e. whether installed code
    /// must be walked and swept each cycle.
    fn is_enabled(&self) -> bool;

    /// Enumerate the reference slots of all currently-installed code. Run
    /// after the reachable graph is known, so the subsequent fixpoint pass
    /// only has to absorb what the code keeps alive.
    fn walk_code_roots(&self, f: &mut dyn FnMut(Address));

    /// Invalidate installed code found to reference only unreachable
    /// objects. Run after every live object has been visited.
    fn sweep_unreachable(&self);
}
