//! Test support: a mock embedding runtime and fixtures for sharing test
//! state. Compiled for unit tests and, behind the `mock_test` feature, for
//! the integration tests under `tests/`.

pub mod mock_runtime;

use atomic_refcell::AtomicRefCell;
use std::sync::Arc;

pub trait FixtureContent {
    fn create() -> Self;
}

/// Lazily-created, shareable test state. `with_fixture` creates the content
/// on first use; later calls observe the same content.
pub struct Fixture<T: FixtureContent> {
    content: AtomicRefCell<Option<Arc<T>>>,
}

impl<T: FixtureContent> Fixture<T> {
    pub fn new() -> Self {
        Fixture {
            content: AtomicRefCell::new(None),
        }
    }

    pub fn with_fixture<F: FnOnce(&T)>(&self, func: F) {
        let content = {
            let mut slot = self.content.borrow_mut();
            slot.get_or_insert_with(|| Arc::new(T::create())).clone()
        };
        func(&content);
    }
}

impl<T: FixtureContent> Default for Fixture<T> {
    fn default() -> Self {
        Self::new()
    }
}
