//! Batch majorize-minimize optimizer.
//!
//! Each pass materializes every row once, builds the per-feature quadratic
//! majorizer of the loss at the current weights, and jumps every weight to
//! the minimum of its regularized majorizer at once.

use sensei_core::concurrency::{ObjectPool, WorkerPool, THREAD_COUNT};
use sensei_core::{JRenumbering, Renumber, J};
use sensei_data::{DependencyGraph, RowExtender, ShardSet};
use tracing::debug;

use crate::error::{OptimizerError, Result};
use crate::logs::{DataSetStats, IterationLog, LogRecord, VectorStats};
use crate::majorizer::Majorizer;
use crate::model::Model;
use crate::{Optimizer, PassContext};

/// Majorize-minimize optimizer with inertia, undo and restart.
///
/// `inertia_factor` and `step_multiplier` have no defaults and must be set
/// before [`Optimizer::make_one_pass`].
///
/// # Example
///
/// ```
/// use sensei_data::{Data, Shard};
/// use sensei_optimizer::{
///     GradBoost, MemoryLogger, Model, Optimizer, PassContext, Regularizations,
/// };
///
/// let mut shard = Shard::new();
/// shard.add_row(&[0], 1.0, 0);
/// shard.add_row(&[], -1.0, 1);
/// let mut data = Data::new();
/// data.training_mut().shards_mut().push(shard);
/// data.dependees_mut().set_row_count(1);
/// data.recalc_stats(1);
///
/// let mut model = Model::new();
/// model.set_size(1);
/// let mut grad_boost = GradBoost::new();
/// grad_boost.set_size(1);
/// grad_boost.set_inertia_factor(0.0);
/// grad_boost.set_step_multiplier(1.0);
///
/// let regularizations = Regularizations::default();
/// let logger = MemoryLogger::new();
/// let ctx = PassContext::new(&data, &regularizations, &logger);
/// grad_boost.make_one_pass(&mut model, &ctx).unwrap();
///
/// assert!(model.w[0] > 0.0);
/// assert!(model.total_loss < model.prev_total_loss);
/// ```
#[derive(Debug)]
pub struct GradBoost {
    training_majorizer: Majorizer,
    holdout_majorizer: Majorizer,
    majorizer_pool: ObjectPool<Majorizer>,
    workers: WorkerPool,
    deterministic: bool,
    inertia_factor: Option<f64>,
    step_multiplier: Option<f64>,
    allow_undo: bool,
    last_iteration_log: Option<IterationLog>,
}

impl Default for GradBoost {
    fn default() -> Self {
        Self::new()
    }
}

impl GradBoost {
    pub fn new() -> Self {
        Self::with_workers(WorkerPool::new(THREAD_COUNT))
    }

    pub fn with_workers(workers: WorkerPool) -> Self {
        Self {
            training_majorizer: Majorizer::default(),
            holdout_majorizer: Majorizer::default(),
            majorizer_pool: ObjectPool::with_default(workers.thread_count()),
            workers,
            deterministic: false,
            inertia_factor: None,
            step_multiplier: None,
            allow_undo: false,
            last_iteration_log: None,
        }
    }

    /// Replaces the worker pool. Must not be called during a pass.
    pub fn set_workers(&mut self, workers: WorkerPool) {
        assert_eq!(self.majorizer_pool.num_grabbed(), 0);
        self.workers = workers;
        self.majorizer_pool = ObjectPool::with_default(workers.thread_count());
    }

    pub fn set_inertia_factor(&mut self, inertia_factor: f64) {
        self.inertia_factor = Some(inertia_factor);
    }

    pub fn set_step_multiplier(&mut self, step_multiplier: f64) {
        self.step_multiplier = Some(step_multiplier);
    }

    pub fn set_allow_undo(&mut self, allow_undo: bool) {
        self.allow_undo = allow_undo;
    }

    pub fn training_majorizer(&self) -> &Majorizer {
        &self.training_majorizer
    }

    pub fn holdout_majorizer(&self) -> &Majorizer {
        &self.holdout_majorizer
    }

    /// Log of the latest sync that did work.
    pub fn last_iteration_log(&self) -> Option<&IterationLog> {
        self.last_iteration_log.as_ref()
    }

    /// Recomputes cached dot products, majorizers and losses at the model's
    /// current weights. A no-op on a synced model.
    pub fn sync_model_with_weights(&mut self, model: &mut Model, ctx: &PassContext<'_>) {
        assert_eq!(
            self.majorizer_pool.num_grabbed(),
            0,
            "majorizers leaked from a previous pass"
        );
        if model.synced_with_weights {
            return;
        }
        let size = model.size();
        assert_eq!(
            self.training_majorizer.size(),
            size,
            "optimizer and model sizes differ"
        );
        let data = ctx.data;
        model.init_per_shards(shard_rows(data.training()), shard_rows(data.holdout()));

        let Model {
            w,
            training,
            holdout,
            ..
        } = &mut *model;
        for (shards, wxs, target) in [
            (data.training(), &mut training.wxs, &mut self.training_majorizer),
            (data.holdout(), &mut holdout.wxs, &mut self.holdout_majorizer),
        ] {
            let pass = MaterializePass {
                pool: &self.majorizer_pool,
                dependees: data.dependees(),
                w,
                size,
            };
            pass.run(shards, wxs, self.workers, self.deterministic);
            reduce_into(&self.majorizer_pool, &self.workers, target);
        }

        let training_stats = data.training().stats();
        let regularization_loss =
            self.training_majorizer
                .regularization_loss(ctx.regularizations, &model.w, training_stats);
        model.set_total_loss(self.training_majorizer.log_loss() + regularization_loss);
        model.loss_derivative = self.training_majorizer.log_loss_derivative_at(
            &model.w,
            ctx.regularizations,
            training_stats,
        );
        model.synced_with_weights = true;

        let log = self.iteration_log(model, ctx, regularization_loss);
        debug!(
            iteration = log.index,
            total_loss = log.total_loss,
            "synced model with weights"
        );
        ctx.logger.add_to_logs(&LogRecord::Iteration(log.clone()));
        self.last_iteration_log = Some(log);
        assert_eq!(self.majorizer_pool.num_grabbed(), 0);
    }

    fn iteration_log(
        &self,
        model: &Model,
        ctx: &PassContext<'_>,
        regularization_loss: f64,
    ) -> IterationLog {
        let data = ctx.data;
        let holdout_rows = shard_rows(data.holdout());
        let holdout_data_stats = (holdout_rows > 0).then(|| DataSetStats {
            size: holdout_rows as u64,
            loss: self.holdout_majorizer.log_loss(),
            dloss: VectorStats::of(&self.holdout_majorizer.log_loss_derivative_at(
                &model.w,
                ctx.regularizations,
                data.holdout().stats(),
            )),
        });
        let deep_counts = data.dependees().transitive_edge_counts(model.size());
        let cpu_operation_count_deep_materialization = deep_counts
            .iter()
            .enumerate()
            .map(|(j, &count)| count * data.xj_bool_count_of_j(j as J))
            .sum();
        IterationLog {
            index: model.iteration_no,
            cpu_operation_count_flat_materialization: self
                .training_majorizer
                .cpu_operation_count_flat_materialization()
                + self.holdout_majorizer.cpu_operation_count_flat_materialization(),
            cpu_operation_count_deep_materialization,
            weight_stats: VectorStats::of(&model.w),
            delta_weight_stats: VectorStats::of(&model.delta_w),
            training_data_stats: DataSetStats {
                size: shard_rows(data.training()) as u64,
                loss: self.training_majorizer.log_loss(),
                dloss: VectorStats::of(&model.loss_derivative),
            },
            holdout_data_stats,
            regularization_loss,
            prev_total_loss: model.prev_total_loss,
            total_loss: model.total_loss,
        }
    }
}

impl Optimizer for GradBoost {
    fn name(&self) -> &'static str {
        "grad_boost"
    }

    fn set_size(&mut self, size: usize) {
        self.training_majorizer.set_size(size);
        self.holdout_majorizer.set_size(size);
    }

    fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
    }

    /// sync, move to the majorizer minimum, sync.
    fn make_one_pass(&mut self, model: &mut Model, ctx: &PassContext<'_>) -> Result<()> {
        let inertia_factor = self
            .inertia_factor
            .ok_or(OptimizerError::MissingParameter("inertia factor"))?;
        let step_multiplier = self
            .step_multiplier
            .ok_or(OptimizerError::MissingParameter("step multiplier"))?;
        self.sync_model_with_weights(model, ctx);
        self.training_majorizer.update_minimum(
            ctx.regularizations,
            inertia_factor,
            step_multiplier,
            ctx.data.training().stats(),
            self.allow_undo,
            model,
            ctx.logger,
        );
        self.sync_model_with_weights(model, ctx);
        Ok(())
    }
}

impl Renumber for GradBoost {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        assert_eq!(self.majorizer_pool.num_grabbed(), 0);
        self.training_majorizer.remove_and_renumber_js(renumbering);
        self.holdout_majorizer.remove_and_renumber_js(renumbering);
    }
}

fn shard_rows(shards: &ShardSet) -> usize {
    shards.shards().iter().map(|s| s.row_count()).sum()
}

/// Read-only inputs of the materialize step.
struct MaterializePass<'a> {
    pool: &'a ObjectPool<Majorizer>,
    dependees: &'a DependencyGraph,
    w: &'a [f64],
    size: usize,
}

impl MaterializePass<'_> {
    /// Accumulates every row of `shards` into pooled majorizers and writes
    /// the row dot products to `wxs` in shard order.
    fn run(&self, shards: &ShardSet, wxs: &mut [f64], workers: WorkerPool, deterministic: bool) {
        let mut tasks = Vec::with_capacity(shards.shards().len());
        let mut rest = wxs;
        for shard in shards.shards() {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(shard.row_count());
            tasks.push((shard, head));
            rest = tail;
        }
        workers.par_for(tasks, deterministic, |(shard, wxs)| {
            let mut majorizer = self.pool.get();
            majorizer.set_size(self.size);
            let mut row = RowExtender::new(self.dependees);
            for (i, wx) in wxs.iter_mut().enumerate() {
                shard.reset_extender(i, &mut row);
                *wx = majorizer.add_row(&row, self.w);
            }
            self.pool.release(majorizer);
        });
    }
}

/// Sums every pooled majorizer into `target` and retires them.
fn reduce_into(pool: &ObjectPool<Majorizer>, workers: &WorkerPool, target: &mut Majorizer) {
    let mut parts = pool.drain_available();
    for part in parts.iter_mut() {
        part.set_size(target.size());
    }
    target.sum_and_assign(&parts, workers);
    for part in parts {
        pool.retire(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::MemoryLogger;
    use crate::regularization::Regularizations;
    use sensei_data::{Data, Shard};

    fn data(rows: &[(&[J], f64)], size: usize) -> Data {
        let mut shard = Shard::new();
        for (id, (js, y)) in rows.iter().enumerate() {
            shard.add_row(js, *y, id as u32);
        }
        let mut data = Data::new();
        data.training_mut().shards_mut().push(shard);
        data.dependees_mut().set_row_count(size);
        data.recalc_stats(size);
        data
    }

    fn grad_boost(size: usize) -> GradBoost {
        let mut grad_boost = GradBoost::with_workers(WorkerPool::new(2));
        grad_boost.set_size(size);
        grad_boost.set_inertia_factor(0.0);
        grad_boost.set_step_multiplier(1.0);
        grad_boost
    }

    #[test]
    fn test_sync_fills_wxs_and_losses() {
        let data = data(&[(&[0], 1.0), (&[0, 1], -1.0)], 2);
        let mut model = Model::new();
        model.set_size(2);
        model.w = vec![1.0, 2.0];
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let ctx = PassContext::new(&data, &regs, &logger);
        let mut gb = grad_boost(2);
        gb.sync_model_with_weights(&mut model, &ctx);

        assert!(model.synced_with_weights);
        assert_eq!(model.training.wxs, vec![1.0, 3.0]);
        let expected = (-1.0f64).exp().ln_1p() + 3.0f64.exp().ln_1p();
        assert!((model.total_loss - expected).abs() < 1e-12);
        assert_eq!(logger.iterations().len(), 1);
        assert!(gb.last_iteration_log().is_some());

        // Synced models are left alone.
        gb.sync_model_with_weights(&mut model, &ctx);
        assert_eq!(logger.len(), 1);
    }

    #[test]
    fn test_missing_parameters() {
        let data = data(&[(&[0], 1.0)], 1);
        let mut model = Model::new();
        model.set_size(1);
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let ctx = PassContext::new(&data, &regs, &logger);
        let mut gb = GradBoost::new();
        gb.set_size(1);
        assert!(matches!(
            gb.make_one_pass(&mut model, &ctx),
            Err(OptimizerError::MissingParameter("inertia factor"))
        ));
        gb.set_inertia_factor(0.0);
        assert!(matches!(
            gb.make_one_pass(&mut model, &ctx),
            Err(OptimizerError::MissingParameter("step multiplier"))
        ));
        assert!(logger.is_empty());
    }

    #[test]
    fn test_deterministic_matches_parallel() {
        let rows: Vec<(Vec<J>, f64)> = (0..40)
            .map(|i| (vec![(i % 3) as J, 3], if i % 4 == 0 { 1.0 } else { -1.0 }))
            .collect();
        let rows: Vec<(&[J], f64)> = rows.iter().map(|(js, y)| (js.as_slice(), *y)).collect();
        let data = data(&rows, 4);
        let regs = Regularizations::standard(0.1, 0.01);
        let logger = MemoryLogger::new();
        let ctx = PassContext::new(&data, &regs, &logger);

        let mut weights = Vec::new();
        for deterministic in [true, false] {
            let mut model = Model::new();
            model.set_size(4);
            let mut gb = grad_boost(4);
            gb.set_deterministic(deterministic);
            for _ in 0..3 {
                gb.make_one_pass(&mut model, &ctx).unwrap();
            }
            weights.push(model.w);
        }
        for (a, b) in weights[0].iter().zip(&weights[1]) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_renumber_majorizers() {
        let mut gb = grad_boost(3);
        gb.remove_and_renumber_js(&JRenumbering::remove_js(&[false, true, false]));
        assert_eq!(gb.training_majorizer().size(), 2);
        assert_eq!(gb.holdout_majorizer().size(), 2);
    }

    #[test]
    #[should_panic(expected = "optimizer and model sizes differ")]
    fn test_size_mismatch_is_fatal() {
        let data = data(&[(&[0], 1.0)], 2);
        let mut model = Model::new();
        model.set_size(2);
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let mut gb = grad_boost(1);
        gb.sync_model_with_weights(&mut model, &PassContext::new(&data, &regs, &logger));
    }
}
