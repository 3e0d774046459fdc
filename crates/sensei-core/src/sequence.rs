//! Monotonic id generators.
//!
//! Generators are plain objects handed to whoever assigns ids (a feature
//! index, a set of data readers sharing row ids) instead of process globals.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::j_renumbering::{INVALID_J, J};

/// Thread-safe monotonic counter.
#[derive(Debug, Default)]
pub struct Sequence {
    next: AtomicU64,
}

impl Sequence {
    /// Creates a sequence whose first value is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a sequence whose first value is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns the next value and advances the sequence.
    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the next value as a feature id, or [`INVALID_J`] once the id
    /// space is exhausted.
    pub fn next_j(&self) -> J {
        J::try_from(self.next_value()).unwrap_or(INVALID_J)
    }

    /// Number of values handed out so far.
    pub fn value(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Restarts the sequence at `next`.
    pub fn set_next(&self, next: u64) {
        self.next.store(next, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sequence_counts_up() {
        let seq = Sequence::new();
        assert_eq!(seq.next_value(), 0);
        assert_eq!(seq.next_value(), 1);
        assert_eq!(seq.value(), 2);
        seq.set_next(10);
        assert_eq!(seq.next_j(), 10);
    }

    #[test]
    fn test_next_j_saturates_to_invalid() {
        let seq = Sequence::starting_at(u64::from(u32::MAX) + 1);
        assert_eq!(seq.next_j(), INVALID_J);
    }

    #[test]
    fn test_concurrent_values_are_unique() {
        let seq = Arc::new(Sequence::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..1000).map(|_| seq.next_value()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
        assert_eq!(seq.value(), 4000);
    }
}
