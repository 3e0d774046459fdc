//! Bounded pool of reusable accumulator objects.

use std::fmt;

use parking_lot::{Condvar, Mutex};

struct PoolState<T> {
    idle: Vec<T>,
    num_grabbed: usize,
}

/// Pool that never lets more than `max_size` objects be checked out at once.
///
/// Objects are handed out by value. [`ObjectPool::release`] puts one back
/// for reuse, [`ObjectPool::retire`] drops it for good (used when partial
/// results are merged at the end of a reduction). `get` blocks while the
/// pool is exhausted; there is no timeout.
pub struct ObjectPool<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    max_size: usize,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ObjectPool")
            .field("max_size", &self.max_size)
            .field("num_grabbed", &state.num_grabbed)
            .field("idle", &state.idle.len())
            .finish()
    }
}

impl<T: Default + 'static> ObjectPool<T> {
    /// Pool creating objects with `T::default()`.
    pub fn with_default(max_size: usize) -> Self {
        Self::new(max_size, T::default)
    }
}

impl<T> ObjectPool<T> {
    /// # Panics
    ///
    /// Panics if `max_size` is 0.
    pub fn new(max_size: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        assert!(max_size > 0, "max_size must be greater than 0");
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(max_size),
                num_grabbed: 0,
            }),
            available: Condvar::new(),
            max_size,
            factory: Box::new(factory),
        }
    }

    /// Checks out an idle object, creating one if none is idle. Blocks while
    /// `max_size` objects are already checked out.
    pub fn get(&self) -> T {
        let mut state = self.state.lock();
        while state.num_grabbed >= self.max_size {
            self.available.wait(&mut state);
        }
        state.num_grabbed += 1;
        match state.idle.pop() {
            Some(object) => object,
            None => {
                drop(state);
                (self.factory)()
            }
        }
    }

    /// Returns an object for reuse.
    pub fn release(&self, object: T) {
        let mut state = self.state.lock();
        assert!(state.num_grabbed > 0, "release without a matching get");
        assert!(state.idle.len() < self.max_size, "pool overflow");
        state.idle.push(object);
        state.num_grabbed -= 1;
        self.available.notify_all();
    }

    /// Drops a checked-out object permanently.
    pub fn retire(&self, object: T) {
        {
            let mut state = self.state.lock();
            assert!(state.num_grabbed > 0, "retire without a matching get");
            state.num_grabbed -= 1;
            self.available.notify_all();
        }
        drop(object);
    }

    /// Checks out every object that can be checked out right now.
    ///
    /// Used by reductions: after a parallel pass has released its partial
    /// accumulators, this collects them (plus fresh ones up to the bound).
    pub fn drain_available(&self) -> Vec<T> {
        let count = self.num_available();
        (0..count).map(|_| self.get()).collect()
    }

    pub fn num_grabbed(&self) -> usize {
        self.state.lock().num_grabbed
    }

    pub fn num_available(&self) -> usize {
        self.max_size - self.state.lock().num_grabbed
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
