//! Hogwild stochastic gradient descent.
//!
//! Worker threads update a shared array of atomic weights without any
//! ordering between writers. Only base l1 and l2 regularization is
//! supported.

use std::sync::atomic::{AtomicU64, Ordering};

use sensei_core::concurrency::{ObjectPool, WorkerPool, THREAD_COUNT};
use sensei_core::util::sign;
use sensei_core::AtomicF64;
use sensei_data::{Data, RowExtender, RowScratch};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{OptimizerError, Result};
use crate::logs::{LogRecord, PassLogger, SgdLearningRateLog};
use crate::model::Model;
use crate::regularization::{Regularization, Regularizations};
use crate::{Optimizer, PassContext};

/// Which weights a pass may move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    #[default]
    AllFeatures,
    /// Only features created by the latest [`Model::set_size`].
    NewFeatures,
}

/// Learning rate schedule; unset fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgdSchedule {
    pub start_learning_rate: Option<f64>,
    pub decay_speed: Option<f64>,
}

/// Sequential learning rate commands, run between passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgdCommand {
    /// Remembers the model's total loss.
    StoreTotalLoss,
    /// Multiplies the start learning rate by `factor` if the total loss went
    /// up since the last `StoreTotalLoss`.
    MaybeReduce { factor: f64 },
}

/// Asynchronous SGD over the training shards.
///
/// The learning rate decays as `start / (1 + decay_speed * rows_seen /
/// training_rows)`, where `rows_seen` counts rows since the start learning
/// rate was last set.
#[derive(Debug)]
pub struct Sgd {
    weights: Vec<AtomicF64>,
    start_learning_rate: Option<f64>,
    decay_speed: f64,
    rows_seen: AtomicU64,
    training_mode: TrainingMode,
    stored_total_loss: f64,
    scratch_pool: ObjectPool<RowScratch>,
    workers: WorkerPool,
    deterministic: bool,
}

impl Default for Sgd {
    fn default() -> Self {
        Self::new()
    }
}

impl Sgd {
    pub fn new() -> Self {
        Self::with_workers(WorkerPool::new(THREAD_COUNT))
    }

    pub fn with_workers(workers: WorkerPool) -> Self {
        Self {
            weights: Vec::new(),
            start_learning_rate: None,
            decay_speed: 0.0,
            rows_seen: AtomicU64::new(0),
            training_mode: TrainingMode::AllFeatures,
            stored_total_loss: f64::INFINITY,
            scratch_pool: ObjectPool::with_default(workers.thread_count()),
            workers,
            deterministic: false,
        }
    }

    pub fn set_workers(&mut self, workers: WorkerPool) {
        assert_eq!(self.scratch_pool.num_grabbed(), 0);
        self.workers = workers;
        self.scratch_pool = ObjectPool::with_default(workers.thread_count());
    }

    pub fn set_training_mode(&mut self, training_mode: TrainingMode) {
        self.training_mode = training_mode;
    }

    pub fn training_mode(&self) -> TrainingMode {
        self.training_mode
    }

    /// Setting a start learning rate restarts the decay.
    pub fn set_learning_rate_schedule(&mut self, schedule: SgdSchedule) {
        if let Some(start) = schedule.start_learning_rate {
            self.start_learning_rate = Some(start);
            self.rows_seen.store(0, Ordering::Relaxed);
        }
        if let Some(decay_speed) = schedule.decay_speed {
            self.decay_speed = decay_speed;
        }
    }

    pub fn start_learning_rate(&self) -> Option<f64> {
        self.start_learning_rate
    }

    pub fn decay_speed(&self) -> f64 {
        self.decay_speed
    }

    /// Current learning rate for a training set of `training_rows` rows.
    pub fn learning_rate(&self, training_rows: u64) -> Option<f64> {
        let start = self.start_learning_rate?;
        let progress = self.rows_seen.load(Ordering::Relaxed) as f64 / training_rows.max(1) as f64;
        Some(start / (1.0 + self.decay_speed * progress))
    }

    /// Checks that a pass could run, logging the reason if not.
    pub fn is_training_valid(&self, data: &Data, regularizations: &Regularizations) -> bool {
        if regularizations.is_non_standard() {
            error!("SGD supports only base l1 and l2 regularization");
            return false;
        }
        if self.start_learning_rate.is_none() {
            error!("SGD start learning rate has not been set");
            return false;
        }
        if data.training().shards().iter().all(|s| s.row_count() == 0) {
            error!("SGD has no training data");
            return false;
        }
        true
    }

    /// Runs a learning rate command against a synced model.
    pub fn run_command(
        &mut self,
        model: &Model,
        command: SgdCommand,
        logger: &dyn PassLogger,
    ) -> Result<()> {
        assert!(
            model.synced_with_weights,
            "SGD commands need a model synced with its weights"
        );
        match command {
            SgdCommand::StoreTotalLoss => {
                self.stored_total_loss = model.total_loss;
                debug!(total_loss = model.total_loss, "stored total loss");
            }
            SgdCommand::MaybeReduce { factor } => {
                if self.stored_total_loss == f64::INFINITY {
                    return Err(OptimizerError::NoStoredLoss);
                }
                let mut log = SgdLearningRateLog {
                    previous_total_loss: self.stored_total_loss,
                    current_total_loss: model.total_loss,
                    ..SgdLearningRateLog::default()
                };
                if self.stored_total_loss < model.total_loss {
                    let old = self
                        .start_learning_rate
                        .ok_or(OptimizerError::MissingLearningRate)?;
                    let new = old * factor;
                    info!(old, new, "loss went up, reducing learning rate");
                    self.start_learning_rate = Some(new);
                    log.previous_learning_rate = Some(old);
                    log.current_learning_rate = Some(new);
                }
                logger.add_to_logs(&LogRecord::SgdLearningRate(log));
            }
        }
        Ok(())
    }

    #[inline]
    fn is_trainable(&self, model: &Model, j: usize) -> bool {
        self.training_mode == TrainingMode::AllFeatures || model.is_feature_new(j as u32)
    }

    fn process_row(&self, row: &RowExtender<'_>, learning_rate: f64, model: &Model) {
        let y = row.y();
        let wx = row.dot_with(|j| self.weights[j as usize].load());
        let sigmoid = 1.0 / (1.0 + (wx * y).exp());
        let delta = learning_rate * y * sigmoid;
        for &j in row.sparse_bool() {
            if self.is_trainable(model, j as usize) {
                self.weights[j as usize].add(delta);
            }
        }
    }

    /// One proximal step of the base regularization. A weight that would
    /// cross zero stops at zero.
    fn shrink(&self, learning_rate: f64, regularization: &Regularization, model: &Model) {
        for (j, weight) in self.weights.iter().enumerate() {
            if !self.is_trainable(model, j) {
                continue;
            }
            weight.update(|old| {
                let delta = (regularization.l1 * sign(old) + 2.0 * regularization.l2 * old)
                    * learning_rate;
                let new = old - delta;
                if new * old < 0.0 {
                    0.0
                } else {
                    new
                }
            });
        }
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "sgd"
    }

    fn set_size(&mut self, size: usize) {
        self.weights = (0..size).map(|_| AtomicF64::new(0.0)).collect();
    }

    fn set_deterministic(&mut self, deterministic: bool) {
        self.deterministic = deterministic;
    }

    /// One pass over the training shards. Leaves the model unsynced.
    fn make_one_pass(&mut self, model: &mut Model, ctx: &PassContext<'_>) -> Result<()> {
        if ctx.regularizations.is_non_standard() {
            return Err(OptimizerError::UnsupportedRegularization);
        }
        if self.start_learning_rate.is_none() {
            return Err(OptimizerError::MissingLearningRate);
        }
        let training = ctx.data.training();
        let rows: u64 = training.shards().iter().map(|s| s.row_count() as u64).sum();
        if rows == 0 {
            return Err(OptimizerError::EmptyTrainingData);
        }
        assert_eq!(
            self.weights.len(),
            model.size(),
            "SGD and model sizes differ"
        );
        for (atomic, &w) in self.weights.iter().zip(&model.w) {
            atomic.store(w);
        }

        assert_eq!(self.scratch_pool.num_grabbed(), 0);
        let this = &*self;
        let model_view = &*model;
        let dependees = ctx.data.dependees();
        let shard_count = training.shards().len() as f64;
        let regularization = ctx.regularizations.base;
        let pass_rows = AtomicU64::new(0);
        this.workers
            .par_for(training.shards(), this.deterministic, |shard| {
                let mut row = RowExtender::with_scratch(dependees, this.scratch_pool.get());
                for i in 0..shard.row_count() {
                    shard.reset_extender(i, &mut row);
                    let learning_rate = this.learning_rate(rows).unwrap_or(0.0);
                    this.rows_seen.fetch_add(1, Ordering::Relaxed);
                    pass_rows.fetch_add(1, Ordering::Relaxed);
                    this.process_row(&row, learning_rate, model_view);
                }
                this.scratch_pool.release(row.into_scratch());
                let learning_rate = this.learning_rate(rows).unwrap_or(0.0);
                this.shrink(learning_rate / shard_count, &regularization, model_view);
            });
        assert_eq!(self.scratch_pool.num_grabbed(), 0);
        assert_eq!(
            pass_rows.into_inner(),
            rows,
            "SGD pass did not visit every row exactly once"
        );

        for (w, atomic) in model.w.iter_mut().zip(&self.weights) {
            *w = atomic.load();
        }
        model.synced_with_weights = false;
        model.iteration_no += 1;
        debug!(
            iteration = model.iteration_no,
            learning_rate = self.learning_rate(rows),
            "SGD pass done"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::MemoryLogger;
    use sensei_core::J;
    use sensei_data::Shard;

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

    fn sgd(size: usize, start: f64) -> Sgd {
        let mut sgd = Sgd::with_workers(WorkerPool::new(2));
        sgd.set_size(size);
        sgd.set_deterministic(true);
        sgd.set_learning_rate_schedule(SgdSchedule {
            start_learning_rate: Some(start),
            decay_speed: Some(0.0),
        });
        sgd
    }

    #[test]
    fn test_single_row_step() {
        let data = data(&[(&[0], 1.0)], 1);
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let mut model = Model::new();
        model.set_size(1);
        let mut sgd = sgd(1, 0.5);
        sgd.make_one_pass(&mut model, &PassContext::new(&data, &regs, &logger))
            .unwrap();
        // sigmoid(0) = 0.5, delta = 0.5 * 1 * 0.5.
        assert_eq!(model.w, vec![0.25]);
        assert!(!model.synced_with_weights);
        assert_eq!(model.iteration_no, 1);
    }

    #[test]
    fn test_passes_over_a_growing_training_set() {
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let mut model = Model::new();
        model.set_size(2);
        let mut sgd = sgd(2, 0.1);

        let small = data(&[(&[0], 1.0), (&[1], -1.0)], 2);
        sgd.make_one_pass(&mut model, &PassContext::new(&small, &regs, &logger))
            .unwrap();
        let grown = data(&[(&[0], 1.0), (&[1], -1.0), (&[0, 1], 1.0)], 2);
        sgd.make_one_pass(&mut model, &PassContext::new(&grown, &regs, &logger))
            .unwrap();

        assert_eq!(sgd.rows_seen.load(Ordering::Relaxed), 5);
        assert_eq!(model.iteration_no, 2);
        assert!(model.w[0] > 0.0);
    }

    #[test]
    fn test_learning_rate_decay() {
        let mut sgd = sgd(1, 1.0);
        sgd.set_learning_rate_schedule(SgdSchedule {
            start_learning_rate: None,
            decay_speed: Some(1.0),
        });
        assert_eq!(sgd.learning_rate(10), Some(1.0));
        sgd.rows_seen.store(10, Ordering::Relaxed);
        assert_eq!(sgd.learning_rate(10), Some(0.5));
        // A new start rate restarts the decay.
        sgd.set_learning_rate_schedule(SgdSchedule {
            start_learning_rate: Some(2.0),
            decay_speed: None,
        });
        assert_eq!(sgd.learning_rate(10), Some(2.0));
        assert_eq!(sgd.decay_speed(), 1.0);
    }

    #[test]
    fn test_shrink_stops_at_zero() {
        let mut sgd = sgd(3, 1.0);
        let mut model = Model::new();
        model.set_size(3);
        for (atomic, w) in sgd.weights.iter().zip([0.3, -2.0, 0.0]) {
            atomic.store(w);
        }
        sgd.shrink(1.0, &Regularization::l1_l2(0.5, 0.0), &model);
        let w: Vec<f64> = sgd.weights.iter().map(AtomicF64::load).collect();
        assert_eq!(w, vec![0.0, -1.5, 0.0]);
        sgd.set_size(1);
        assert_eq!(sgd.weights.len(), 1);
    }

    #[test]
    fn test_new_features_mode_skips_old_weights() {
        let data = data(&[(&[0, 1], 1.0)], 2);
        let regs = Regularizations::default();
        let logger = MemoryLogger::new();
        let mut model = Model::new();
        model.set_size(1);
        model.w[0] = 1.0;
        model.set_size(2);
        let mut sgd = sgd(2, 1.0);
        sgd.set_training_mode(TrainingMode::NewFeatures);
        sgd.make_one_pass(&mut model, &PassContext::new(&data, &regs, &logger))
            .unwrap();
        assert_eq!(model.w[0], 1.0);
        assert!(model.w[1] > 0.0);
    }

    #[test]
    fn test_invalid_setups() {
        let data = data(&[(&[0], 1.0)], 1);
        let empty = Data::new();
        let logger = MemoryLogger::new();
        let mut model = Model::new();
        model.set_size(1);

        let mut regs = Regularizations::default();
        regs.base.l1_at_weight_zero = 1.0;
        let mut sgd = sgd(1, 1.0);
        assert!(!sgd.is_training_valid(&data, &regs));
        assert!(matches!(
            sgd.make_one_pass(&mut model, &PassContext::new(&data, &regs, &logger)),
            Err(OptimizerError::UnsupportedRegularization)
        ));

        let regs = Regularizations::default();
        assert!(matches!(
            sgd.make_one_pass(&mut model, &PassContext::new(&empty, &regs, &logger)),
            Err(OptimizerError::EmptyTrainingData)
        ));

        let mut unscheduled = Sgd::new();
        unscheduled.set_size(1);
        assert!(!unscheduled.is_training_valid(&data, &regs));
        assert!(matches!(
            unscheduled.make_one_pass(&mut model, &PassContext::new(&data, &regs, &logger)),
            Err(OptimizerError::MissingLearningRate)
        ));
        assert!(sgd.is_training_valid(&data, &regs));
    }

    #[test]
    fn test_maybe_reduce() {
        let logger = MemoryLogger::new();
        let mut model = Model::new();
        model.synced_with_weights = true;
        model.total_loss = 10.0;
        let mut sgd = sgd(0, 1.0);

        assert!(matches!(
            sgd.run_command(&model, SgdCommand::MaybeReduce { factor: 0.5 }, &logger),
            Err(OptimizerError::NoStoredLoss)
        ));
        sgd.run_command(&model, SgdCommand::StoreTotalLoss, &logger)
            .unwrap();

        model.total_loss = 9.0;
        sgd.run_command(&model, SgdCommand::MaybeReduce { factor: 0.5 }, &logger)
            .unwrap();
        assert_eq!(sgd.start_learning_rate(), Some(1.0));

        model.total_loss = 11.0;
        sgd.run_command(&model, SgdCommand::MaybeReduce { factor: 0.5 }, &logger)
            .unwrap();
        assert_eq!(sgd.start_learning_rate(), Some(0.5));
        match logger.last() {
            Some(LogRecord::SgdLearningRate(log)) => {
                assert_eq!(log.previous_learning_rate, Some(1.0));
                assert_eq!(log.current_learning_rate, Some(0.5));
                assert_eq!(log.previous_total_loss, 10.0);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(logger.len(), 2);
    }

    #[test]
    #[should_panic(expected = "synced with its weights")]
    fn test_command_on_unsynced_model_is_fatal() {
        let mut sgd = Sgd::new();
        let _ = sgd.run_command(&Model::new(), SgdCommand::StoreTotalLoss, &MemoryLogger::new());
    }
}
