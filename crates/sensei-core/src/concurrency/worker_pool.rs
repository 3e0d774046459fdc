//! Fork-join parallel-for over a fixed number of worker threads.

use std::ops::Range;
use std::thread;

use super::wait_queue::WaitQueue;

/// Default number of worker threads.
pub const THREAD_COUNT: usize = 4;

/// Runs closures over collections on a fixed-size set of worker threads.
///
/// Every [`WorkerPool::par_for`] call spawns `thread_count` scoped workers
/// that pull one task per element from a [`WaitQueue`], and joins them
/// before returning. Calls always run to completion.
///
/// Workers live for one call only, so closures may borrow from the caller's
/// stack, and each parallel call costs `thread_count` thread spawns. Callers
/// batch work per shard or per range to keep that cost small next to a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    thread_count: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(THREAD_COUNT)
    }
}

impl WorkerPool {
    /// # Panics
    ///
    /// Panics if `thread_count` is 0.
    pub fn new(thread_count: usize) -> Self {
        assert!(thread_count > 0, "thread_count must be greater than 0");
        Self { thread_count }
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Calls `f` once per item.
    ///
    /// With `deterministic` the items are processed in order on the calling
    /// thread. Otherwise completion order is unspecified, so `f` must only
    /// perform order-independent work.
    pub fn par_for<I, F>(&self, items: I, deterministic: bool, f: F)
    where
        I: IntoIterator,
        I::Item: Send,
        F: Fn(I::Item) + Sync,
    {
        if deterministic {
            items.into_iter().for_each(f);
            return;
        }
        let queue = WaitQueue::new();
        let queue = &queue;
        let f = &f;
        thread::scope(|scope| {
            for _ in 0..self.thread_count {
                scope.spawn(move || {
                    while let Some(item) = queue.wait() {
                        f(item);
                    }
                });
            }
            for item in items {
                queue.push(item);
            }
            queue.stop_waiters();
        });
    }

    /// Splits `0..len` into `thread_count` contiguous ranges and runs `f` on
    /// each of them in parallel.
    pub fn par_for_ranges<F>(&self, len: usize, f: F)
    where
        F: Fn(Range<usize>) + Sync,
    {
        self.par_for(split_evenly(len, self.thread_count), false, f);
    }
}

/// Splits `0..len` into `parts` contiguous ranges whose lengths differ by at
/// most one. Ranges may be empty when `len < parts`.
pub fn split_evenly(len: usize, parts: usize) -> Vec<Range<usize>> {
    assert!(parts > 0, "parts must be greater than 0");
    let base = len / parts;
    let extra = len % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}
