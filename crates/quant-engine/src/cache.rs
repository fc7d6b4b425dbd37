//! Whole-value swap cells shared between loops.

use parking_lot::RwLock;
use std::sync::Arc;

/// A cache cell whose value is only ever replaced, never mutated in place.
///
/// Readers get an `Arc` to a complete value and keep it as long as they like;
/// a writer builds the next value off to the side and swaps the pointer.
#[derive(Debug)]
pub struct SharedCache<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> SharedCache<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Arc::new(value)),
        }
    }

    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.inner.read())
    }

    pub fn store(&self, value: T) {
        *self.inner.write() = Arc::new(value);
    }

    /// Read-modify-write under the write lock, for cells with several writers.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.inner.write();
        let next = f(&guard);
        *guard = Arc::new(next);
    }
}

impl<T: Default> Default for SharedCache<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
