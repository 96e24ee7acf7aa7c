// Integration tests driving whole collection cycles over the mock runtime
// through the crate's public surface. Run with `--features mock_test`.
#![cfg(feature = "mock_test")]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use gengc::collect::watcher::CollectionWatcher;
use gengc::collect::watcher::WatcherMark;
use gengc::collect::watcher::WatcherResult;
use gengc::memory_manager;
use gengc::runtime::Heap;
use gengc::util::address::Address;
use gengc::util::options::Options;
use gengc::util::options::PolicySelector;
use gengc::util::test_util::mock_runtime::mock_gc;
use gengc::util::test_util::mock_runtime::MockGen;
use gengc::util::test_util::mock_runtime::MockRuntime;
use gengc::util::test_util::Fixture;
use gengc::util::test_util::FixtureContent;
use gengc::GcCause;
use gengc::GenGC;

fn complete_only_options() -> Options {
    let mut options = Options::default();
    options.policy = PolicySelector::OnlyCompletely;
    options
}

struct ScavengeFixture {
    gc: GenGC<MockRuntime>,
    root: Address,
}

impl FixtureContent for ScavengeFixture {
    fn create() -> Self {
        let gc = mock_gc(complete_only_options());
        let heap = &gc.runtime().heap;
        let leaf = heap.add_young(&[None]);
        let holder = heap.add_young(&[Some(leaf)]);
        heap.add_young(&[None]); // garbage
        let root = heap.add_root_slot(Some(holder));
        gc.runtime().stack_walker.add_global_root(root);
        ScavengeFixture { gc, root }
    }
}

#[test]
fn collection_through_the_flat_entry_points() {
    let fixture = Fixture::<ScavengeFixture>::new();
    fixture.with_fixture(|f| {
        memory_manager::request_collection(&f.gc, GcCause::UserRequested).unwrap();
        assert_eq!(memory_manager::current_epoch(&f.gc).as_u64(), 1);
        let heap = &f.gc.runtime().heap;
        let holder = heap.read_slot(f.root).unwrap();
        assert_eq!(heap.generation_of(holder), Some(MockGen::Old));
        let leaf = heap.read_slot(heap.slot_address(holder, 0)).unwrap();
        assert_eq!(heap.generation_of(leaf), Some(MockGen::Old));
    });
}

#[derive(Default)]
struct CountingWatcher {
    mark: WatcherMark,
    before: AtomicUsize,
    after: AtomicUsize,
    reports: AtomicUsize,
}

impl CollectionWatcher for CountingWatcher {
    fn mark(&self) -> &WatcherMark {
        &self.mark
    }

    fn before_collection(&self) -> WatcherResult {
        self.before.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn after_collection(&self) -> WatcherResult {
        self.after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn report(&self) -> WatcherResult {
        self.reports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn watcher_sees_each_cycle_until_unregistered() {
    let gc = mock_gc(complete_only_options());
    let watcher = Arc::new(CountingWatcher::default());
    memory_manager::register_watcher(&gc, watcher.clone()).unwrap();

    memory_manager::request_collection(&gc, GcCause::UserRequested).unwrap();
    assert_eq!(watcher.before.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.after.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.reports.load(Ordering::SeqCst), 1);

    memory_manager::unregister_watcher(&gc, watcher.as_ref());
    memory_manager::request_collection(&gc, GcCause::UserRequested).unwrap();
    assert_eq!(watcher.before.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.after.load(Ordering::SeqCst), 1);

    // Single-use: the watcher cannot come back.
    assert!(memory_manager::register_watcher(&gc, watcher).is_err());
}

#[test]
fn pin_keeps_bytes_in_place_across_cycles() {
    let gc = mock_gc(complete_only_options());
    let heap = &gc.runtime().heap;
    let pinned = heap.add_young(&[None]);
    let handle = memory_manager::pin_object(&gc, pinned).unwrap();

    memory_manager::request_collection(&gc, GcCause::UserRequested).unwrap();
    assert!(heap.contains(pinned));
    assert_eq!(heap.generation_of(pinned), Some(MockGen::Old));

    drop(handle);
    memory_manager::request_collection(&gc, GcCause::UserRequested).unwrap();
    assert!(!heap.contains(pinned));
}

#[test]
fn complete_request_collects_the_old_generation() {
    let mut options = Options::default();
    options.policy = PolicySelector::OnlyIncrementally;
    let gc = mock_gc(options);
    let heap = &gc.runtime().heap;
    let old_garbage = heap.add_old(&[None]);

    memory_manager::request_complete_collection(&gc, GcCause::UserRequested).unwrap();
    assert!(gc.last_collection_was_complete());
    assert!(!heap.contains(old_garbage));
}

#[test]
fn summary_logging_smoke() {
    let mut options = complete_only_options();
    options.print_gc_summary = true;
    options.detailed_accounting = true;
    let gc = mock_gc(options);
    let heap = &gc.runtime().heap;
    let live = heap.add_young(&[None]);
    let root = heap.add_root_slot(Some(live));
    gc.runtime().stack_walker.add_global_root(root);

    memory_manager::request_collection(&gc, GcCause::UserRequested).unwrap();
    memory_manager::request_collection(&gc, GcCause::Diagnostic).unwrap();
    memory_manager::log_gc_summary(&gc);

    assert_eq!(memory_manager::current_epoch(&gc).as_u64(), 2);
}
