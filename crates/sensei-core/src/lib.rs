//! Foundational types for Sensei.
//!
//! Sensei fits sparse logistic-regression models over boolean features and
//! grows or shrinks its feature set between passes. This crate holds what
//! every other layer agrees on:
//!
//! - **Feature ids**: [`J`], the [`INVALID_J`] sentinel, and [`JRenumbering`],
//!   the stable compaction every id-indexed structure applies through the
//!   [`Renumber`] trait when features are removed.
//! - **Id generators**: [`Sequence`], passed explicitly to whoever assigns ids.
//! - **Concurrency substrate**: [`concurrency::WorkerPool`] (fork-join
//!   parallel-for), [`concurrency::ObjectPool`] (bounded thread-local
//!   accumulators), [`concurrency::WaitQueue`] and
//!   [`concurrency::WeightedSemaphore`].
//! - **Numeric helpers**: sparse dot products, norms, an atomic `f64`.
//!
//! # Example
//!
//! ```
//! use sensei_core::{JRenumbering, Renumber};
//!
//! struct Weights(Vec<f64>);
//!
//! impl Renumber for Weights {
//!     fn remove_and_renumber_js(&mut self, r: &JRenumbering) {
//!         r.renumber_indices(&mut self.0);
//!     }
//! }
//!
//! let mut w = Weights(vec![0.5, 1.5, 2.5]);
//! w.remove_and_renumber_js(&JRenumbering::remove_js(&[false, true, false]));
//! assert_eq!(w.0, vec![0.5, 2.5]);
//! ```

pub mod concurrency;
pub mod error;
pub mod j_renumbering;
pub mod sequence;
pub mod util;

pub use error::{CoreError, Result};
pub use j_renumbering::{JRenumbering, Renumber, INVALID_J, J};
pub use sequence::Sequence;
pub use util::AtomicF64;

/// Reserved row id; data sets hold at most `u32::MAX - 1` rows.
pub const INVALID_ROW_ID: u32 = u32::MAX;

