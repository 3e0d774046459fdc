//! Weight fitting for Sensei models.
//!
//! Two optimizers move the weights of a shared [`Model`]; both implement
//! the [`Optimizer`] trait:
//!
//! - [`GradBoost`] - batch majorize-minimize. Every pass builds a
//!   per-feature quadratic upper bound of the logistic loss ([`Majorizer`])
//!   and jumps to its regularized minimum, with inertia and two safety nets
//!   (undo when the loss went up, restart when inertia overshot).
//! - [`Sgd`] - Hogwild stochastic gradient descent over atomic shadow
//!   weights with a decaying learning rate.
//!
//! Each pass reports to a [`PassLogger`] through [`LogRecord`]s.
//!
//! # Example
//!
//! ```
//! use sensei_data::{Data, Shard};
//! use sensei_optimizer::{
//!     GradBoost, MemoryLogger, Model, Optimizer, PassContext, Regularizations,
//! };
//!
//! let mut shard = Shard::new();
//! shard.add_row(&[0], 1.0, 0);
//! shard.add_row(&[0], 1.0, 1);
//! shard.add_row(&[0], -1.0, 2);
//! let mut data = Data::new();
//! data.training_mut().shards_mut().push(shard);
//! data.dependees_mut().set_row_count(1);
//! data.recalc_stats(1);
//!
//! let mut model = Model::new();
//! model.set_size(1);
//! let mut optimizer = GradBoost::new();
//! optimizer.set_size(1);
//! optimizer.set_inertia_factor(0.0);
//! optimizer.set_step_multiplier(1.0);
//!
//! let regularizations = Regularizations::default();
//! let logger = MemoryLogger::new();
//! let ctx = PassContext::new(&data, &regularizations, &logger);
//! for _ in 0..20 {
//!     optimizer.make_one_pass(&mut model, &ctx).unwrap();
//! }
//! // Two positives out of three: w converges to ln 2.
//! assert!((model.w[0] - 2f64.ln()).abs() < 1e-3);
//! ```

pub mod error;
pub mod grad_boost;
pub mod logs;
pub mod majorizer;
pub mod model;
pub mod regularization;
pub mod sgd;

pub use error::{OptimizerError, Result};
pub use grad_boost::GradBoost;
pub use logs::{
    DataSetStats, EvaluationLog, FeatureExplorationLog, FeaturePruningLog, IterationLog, LiftAt,
    LogRecord, MemoryLogger, PassLogger, ScoreStats, SgdLearningRateLog, TracingLogger,
    UpdateMinimumLog, VectorStats,
};
pub use majorizer::{Dim1Majorizer, Majorizer};
pub use model::{Model, PerShard};
pub use regularization::{Regularization, Regularizations};
pub use sgd::{Sgd, SgdCommand, SgdSchedule, TrainingMode};

use sensei_data::Data;

/// Read-only inputs shared by every pass.
#[derive(Clone, Copy)]
pub struct PassContext<'a> {
    pub data: &'a Data,
    pub regularizations: &'a Regularizations,
    pub logger: &'a dyn PassLogger,
}

impl<'a> PassContext<'a> {
    pub fn new(
        data: &'a Data,
        regularizations: &'a Regularizations,
        logger: &'a dyn PassLogger,
    ) -> Self {
        Self {
            data,
            regularizations,
            logger,
        }
    }
}

/// Common interface of the weight optimizers.
pub trait Optimizer {
    fn name(&self) -> &'static str;

    /// Resizes per-feature state to `size` features.
    fn set_size(&mut self, size: usize);

    /// Forces single-threaded, in-order passes.
    fn set_deterministic(&mut self, deterministic: bool);

    /// Runs one pass over the training data, moving `model.w`.
    fn make_one_pass(&mut self, model: &mut Model, ctx: &PassContext<'_>) -> Result<()>;
}
