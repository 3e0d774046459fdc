//! Small numeric helpers shared by the data and optimizer crates.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::j_renumbering::J;

/// Returns -1, 0 or 1.
#[inline]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Dot product of a boolean sparse row with a dense vector.
#[inline]
pub fn sparse_dot(js: &[J], w: &[f64]) -> f64 {
    js.iter().map(|&j| w[j as usize]).sum()
}

/// Sum of absolute values.
pub fn l1_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

/// Sum of squares.
pub fn l2_norm_squared(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

pub fn non_zero_count(v: &[f64]) -> u64 {
    v.iter().filter(|&&x| x != 0.0).count() as u64
}

/// 64-bit finalizer (splitmix64) used for order-independent row checksums.
#[inline]
pub fn hash64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// `f64` with atomic load, store and add, stored as raw bits.
#[derive(Debug, Default)]
pub struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Replaces the value with `f(old)` in a compare-and-swap retry loop.
    /// Returns the value written.
    #[inline]
    pub fn update(&self, f: impl Fn(f64) -> f64) -> f64 {
        let mut old_bits = self.bits.load(Ordering::Relaxed);
        loop {
            let new_value = f(f64::from_bits(old_bits));
            match self.bits.compare_exchange_weak(
                old_bits,
                new_value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return new_value,
                Err(current) => old_bits = current,
            }
        }
    }

    /// Adds `delta` with a compare-and-swap retry loop.
    #[inline]
    pub fn add(&self, delta: f64) {
        self.update(|old| old + delta);
    }
}
