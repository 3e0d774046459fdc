//! Unbounded blocking multi-producer multi-consumer queue.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// Queue whose consumers block until an item arrives or the queue is stopped.
///
/// Stopping does not discard queued items: waiters keep draining them and
/// only report failure once the queue is both stopped and empty.
#[derive(Debug)]
pub struct WaitQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push_back(item);
        self.available.notify_one();
    }

    /// Blocks until an item is available. Returns `None` once the queue has
    /// been stopped and drained.
    pub fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Non-blocking pop.
    pub fn pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Wakes every waiter; later waits on an empty queue return `None`.
    pub fn stop_waiters(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        self.available.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}
