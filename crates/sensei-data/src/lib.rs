//! Sparse boolean data sets for Sensei.
//!
//! Rows are sets of active feature ids with a ±1 label. They are stored in
//! [`CsrMatrix`] form inside [`Shard`]s, which are grouped into a training
//! and a holdout [`ShardSet`] inside [`Data`].
//!
//! Only the features read from the input are stored. Product features are
//! derived on the fly: [`RowExtender`] walks the [`DependencyGraph`] from
//! the stored ids and activates every product whose two factors are active.
//! [`Stats`] are always computed over these materialized rows.
//!
//! Every structure here is indexed by feature id and implements
//! [`sensei_core::Renumber`].
//!
//! # Example
//!
//! ```
//! use sensei_data::{Data, Shard};
//!
//! let mut shard = Shard::new();
//! shard.add_row(&[0, 1], 1.0, 0);
//! shard.add_row(&[1], -1.0, 1);
//!
//! let mut data = Data::new();
//! data.training_mut().shards_mut().push(shard);
//! data.dependees_mut().set_row_count(3);
//! data.dependees_mut().extend(&[(0, 2), (1, 2)]);
//! data.recalc_stats(3);
//!
//! // Feature 2 = 0 AND 1 is active in the first row only.
//! assert_eq!(data.training().stats().positive(2), 1);
//! assert_eq!(data.training().stats().negative(2), 0);
//! ```

pub mod csr_matrix;
pub mod dependees;
pub mod row_extender;
pub mod shard;
pub mod shard_set;
pub mod stats;

pub use csr_matrix::{CooMatrix, CsrMatrix};
pub use dependees::DependencyGraph;
pub use row_extender::{RowExtender, RowScratch};
pub use shard::{Shard, ShardBuilder};
pub use shard_set::{Data, ShardAdder, ShardSet, DEFAULT_MAX_SHARD_SIZE};
pub use stats::{CorrelationTable, Stats};
