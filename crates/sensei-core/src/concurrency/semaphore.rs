//! Weighted counting semaphore.

use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Semaphore whose permits are acquired in arbitrary amounts.
///
/// Bounds concurrent resource-heavy work, e.g. the number of files being
/// parsed at once.
#[derive(Debug)]
pub struct WeightedSemaphore {
    value: Mutex<u64>,
    capacity: u64,
    available: Condvar,
}

impl WeightedSemaphore {
    pub fn new(capacity: u64) -> Self {
        Self {
            value: Mutex::new(capacity),
            capacity,
            available: Condvar::new(),
        }
    }

    /// Blocks until `cost` permits are free and takes them.
    ///
    /// Returns `false` without blocking when `cost` exceeds the total
    /// capacity, since such a request could never be granted.
    pub fn acquire(&self, cost: u64) -> bool {
        if cost > self.capacity {
            warn!(cost, capacity = self.capacity, "semaphore request exceeds capacity");
            return false;
        }
        let mut value = self.value.lock();
        while *value < cost {
            self.available.wait(&mut value);
        }
        *value -= cost;
        true
    }

    pub fn release(&self, cost: u64) {
        let mut value = self.value.lock();
        *value += cost;
        debug_assert!(*value <= self.capacity);
        self.available.notify_all();
    }

    /// Takes a single permit for the lifetime of the returned guard.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore has zero capacity.
    pub fn lock(&self) -> SemaphoreGuard<'_> {
        assert!(self.acquire(1), "semaphore has no capacity");
        SemaphoreGuard { semaphore: self }
    }

    pub fn available(&self) -> u64 {
        *self.value.lock()
    }
}

/// Releases one permit on drop.
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    semaphore: &'a WeightedSemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.semaphore.release(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_and_release() {
        let s = WeightedSemaphore::new(5);
        assert!(s.acquire(3));
        assert_eq!(s.available(), 2);
        s.release(3);
        assert_eq!(s.available(), 5);
    }

    #[test]
    fn test_oversized_request_fails_fast() {
        let s = WeightedSemaphore::new(2);
        assert!(!s.acquire(3));
        assert_eq!(s.available(), 2);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let s = WeightedSemaphore::new(1);
        {
            let _guard = s.lock();
            assert_eq!(s.available(), 0);
        }
        assert_eq!(s.available(), 1);
    }

    #[test]
    fn test_bounds_concurrency() {
        let s = Arc::new(WeightedSemaphore::new(2));
        let active = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (s, active, peak) = (Arc::clone(&s), Arc::clone(&active), Arc::clone(&peak));
                thread::spawn(move || {
                    let _guard = s.lock();
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
