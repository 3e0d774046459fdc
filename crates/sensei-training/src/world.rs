//! Owner of every feature-indexed structure.

use std::sync::Arc;

use sensei_core::concurrency::WorkerPool;
use sensei_core::{JRenumbering, Renumber, Sequence, J};
use sensei_data::{Data, ShardAdder, ShardBuilder};
use sensei_feature_index::{FeatureMap, FeatureSet, JProduct, ProductMap};
use sensei_optimizer::{
    EvaluationLog, FeatureExplorationLog, FeaturePruningLog, GradBoost, LogRecord, Model,
    Optimizer, PassContext, PassLogger, Sgd, SgdCommand, TracingLogger, TrainingMode,
};
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::error::{Result, TrainingError};
use crate::evaluation::score_stats;
use crate::ingest::{FeatureSpec, LabeledRow, RowIngestor};

/// Which data set rows go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetKind {
    Training,
    Holdout,
}

/// The feature maps, data, model and optimizers of one training run.
///
/// Global feature ids are [`ProductMap`] ids; the [`FeatureMap`] only names
/// the factors of products. Adding or removing features goes through
/// [`World::add_features`] and [`World::remove_and_renumber`], which keep
/// every id-indexed structure the same size.
///
/// # Example
///
/// ```
/// use sensei_training::{DataSetKind, FeatureSpec, LabeledRow, TrainingConfig, World};
///
/// let mut config = TrainingConfig::default();
/// config.deterministic = true;
/// let mut world = World::new(config).unwrap();
/// let rows = vec![
///     LabeledRow::new(["a", "b"], 1.0),
///     LabeledRow::new(["a"], -1.0),
///     LabeledRow::new(["b"], -1.0),
/// ];
/// world.add_rows(&rows, &[FeatureSpec::bias(), FeatureSpec::new([""])], DataSetKind::Training);
/// assert_eq!(world.j_size(), 3);
///
/// world.initialize_bias().unwrap();
/// world.fit_model_weights(5).unwrap();
/// assert!(world.model().synced_with_weights);
/// ```
pub struct World {
    config: TrainingConfig,
    workers: WorkerPool,
    data: Data,
    feature_map: FeatureMap,
    product_map: ProductMap,
    row_ids: Sequence,
    model: Model,
    grad_boost: GradBoost,
    sgd: Sgd,
    logger: Arc<dyn PassLogger>,
    j_size: usize,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("j_size", &self.j_size)
            .field("feature_map_size", &self.feature_map.len())
            .field("training_rows", &self.data.training().stats().row_count())
            .field("holdout_rows", &self.data.holdout().stats().row_count())
            .finish_non_exhaustive()
    }
}

impl World {
    /// A world logging pass records through `tracing`.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: TrainingConfig, logger: Arc<dyn PassLogger>) -> Result<Self> {
        let mut world = Self {
            config: TrainingConfig::default(),
            workers: WorkerPool::default(),
            data: Data::new(),
            feature_map: FeatureMap::new(),
            product_map: ProductMap::new(),
            row_ids: Sequence::new(),
            model: Model::new(),
            grad_boost: GradBoost::new(),
            sgd: Sgd::new(),
            logger,
            j_size: 0,
        };
        world.apply_config(config)?;
        Ok(world)
    }

    /// Pushes `config` into every component.
    pub fn apply_config(&mut self, config: TrainingConfig) -> Result<()> {
        config.validate()?;
        self.workers = WorkerPool::new(config.thread_count);
        self.data.set_workers(self.workers);
        self.data.set_max_shard_size(config.max_shard_size);

        self.grad_boost.set_workers(self.workers);
        self.grad_boost.set_deterministic(config.deterministic);
        self.grad_boost.set_inertia_factor(config.inertia_factor);
        self.grad_boost.set_step_multiplier(config.step_multiplier);
        self.grad_boost.set_allow_undo(config.allow_undo);

        self.sgd.set_workers(self.workers);
        self.sgd.set_deterministic(config.deterministic);
        self.sgd.set_learning_rate_schedule(config.sgd);

        debug!(?config, "applied config");
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn feature_map(&self) -> &FeatureMap {
        &self.feature_map
    }

    pub fn product_map(&self) -> &ProductMap {
        &self.product_map
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Direct access to weights, e.g. for warm starts. Clears the synced flag.
    pub fn model_mut(&mut self) -> &mut Model {
        self.model.synced_with_weights = false;
        &mut self.model
    }

    pub fn grad_boost(&self) -> &GradBoost {
        &self.grad_boost
    }

    pub fn sgd(&self) -> &Sgd {
        &self.sgd
    }

    /// Number of features.
    pub fn j_size(&self) -> usize {
        self.j_size
    }

    fn set_j_size(&mut self, size: usize) {
        self.j_size = size;
        self.model.set_size(size);
        self.model.synced_with_weights = false;
        self.grad_boost.set_size(size);
        self.sgd.set_size(size);
    }

    /// Ingests `rows` in parallel chunks and grows every structure to the
    /// products they created.
    pub fn add_rows(&mut self, rows: &[LabeledRow], specs: &[FeatureSpec], kind: DataSetKind) {
        let first_j = self.product_map.len();
        let ingestor = RowIngestor::new(&self.feature_map, &self.product_map, specs, &self.row_ids);
        let chunk_size = rows.len().div_ceil(self.workers.thread_count()).max(1);
        let shard_set = match kind {
            DataSetKind::Training => self.data.training_mut(),
            DataSetKind::Holdout => self.data.holdout_mut(),
        };
        let max_shard_size = shard_set.max_shard_size();
        let adder = ShardAdder::new(shard_set);
        self.workers
            .par_for(rows.chunks(chunk_size), self.config.deterministic, |chunk| {
                let mut builder = ShardBuilder::new(max_shard_size);
                let feature_count = ingestor.ingest(chunk, &mut builder);
                adder.add(feature_count, builder);
            });
        drop(adder);
        self.feature_map.sync_j_to_feature_map();
        info!(rows = rows.len(), ?kind, "ingested rows");
        self.add_features(first_j, self.product_map.len());
    }

    /// Takes in features `from..to` just created in the product map.
    ///
    /// # Panics
    ///
    /// Panics if the product map does not have exactly `to` features.
    pub fn add_features(&mut self, from: usize, to: usize) {
        assert_eq!(self.product_map.len(), to, "product map size mismatch");
        assert!(from <= to, "cannot add features {from}..{to}");
        self.product_map.sync_j_to_feature_map();
        self.data.dependees_mut().set_row_count(to);
        self.data.recalc_stats(to);
        self.set_j_size(to);
        debug!(from, to, "added features");
    }

    /// Applies `renumbering` to every id-indexed structure at once.
    pub fn remove_and_renumber(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_no_op() {
            return;
        }
        let new_size = renumbering.next_j() as usize;
        self.data.remove_and_renumber_js(renumbering);
        self.grad_boost.remove_and_renumber_js(renumbering);
        self.model.remove_and_renumber_js(renumbering);
        self.model.synced_with_weights = false;
        self.product_map.remove_and_renumber_js(renumbering);
        self.sgd.set_size(new_size);
        self.j_size = new_size;
    }

    /// Removes every feature with `mask[j]` set.
    ///
    /// A product is materialized only while both of its factors exist;
    /// removing a factor leaves the product inactive in every row.
    pub fn remove_features(&mut self, mask: &[bool]) -> FeaturePruningLog {
        assert_eq!(mask.len(), self.j_size, "removal mask size mismatch");
        self.remove_and_renumber(&JRenumbering::remove_js(mask));
        let log = FeaturePruningLog {
            features_removed: mask.iter().filter(|&&removed| removed).count() as u64,
            features_left: self.j_size as u64,
        };
        self.logger.add_to_logs(&LogRecord::FeaturePruning(log));
        log
    }

    /// Removes every product with at least one factor in `feature_set`.
    pub fn remove_features_in_set(&mut self, feature_set: &FeatureSet) -> FeaturePruningLog {
        let factors = self.feature_map.feature_set_to_js(feature_set);
        let mask = self.product_map.have_at_least_one_feature_j(&factors);
        self.remove_features(&mask)
    }

    /// Creates the conjunction of each pair of existing features.
    ///
    /// Products that already exist or have more than `max_product_size`
    /// factors are skipped. New products get dependee edges from both
    /// halves of their pair.
    pub fn add_product_features(
        &mut self,
        pairs: &[(J, J)],
        max_product_size: Option<usize>,
    ) -> FeatureExplorationLog {
        let first_j = self.product_map.len();
        let previous_xj_bool_count = self.data.materialized_xj_bool_count();
        let mut log = FeatureExplorationLog::default();
        let mut edges = Vec::with_capacity(2 * pairs.len());
        for &(a, b) in pairs {
            assert_ne!(a, b, "cannot multiply feature {a} by itself");
            let (a, b) = (a.min(b), a.max(b));
            assert!((b as usize) < first_j, "feature {b} does not exist yet");
            let product = JProduct::and(
                self.product_map.j_to_feature_unchecked(a),
                self.product_map.j_to_feature_unchecked(b),
            );
            if self.product_map.has_feature(&product) {
                log.present_features_skipped += 1;
                continue;
            }
            if max_product_size.is_some_and(|max| product.len() > max) {
                log.too_large_features_skipped += 1;
                continue;
            }
            let new_j = self.product_map.feature_to_j(&product);
            edges.push((a, new_j));
            edges.push((b, new_j));
            log.features_added += 1;
        }
        let size = self.product_map.len();
        self.data.dependees_mut().set_row_count(size);
        self.data.dependees_mut().extend(&edges);
        self.add_features(first_j, size);

        log.xj_bools_added = self.data.materialized_xj_bool_count() - previous_xj_bool_count;
        info!(
            added = log.features_added,
            present = log.present_features_skipped,
            too_large = log.too_large_features_skipped,
            "explored product features"
        );
        self.logger.add_to_logs(&LogRecord::FeatureExploration(log));
        log
    }

    /// Sets the bias weight to the training log-odds.
    pub fn initialize_bias(&mut self) -> Result<()> {
        let bias_j = self.product_map.bias_j().ok_or(TrainingError::MissingBias)?;
        let log_odds = self.data.training().stats().log_odds(bias_j);
        self.model.w[bias_j as usize] = log_odds;
        self.model.synced_with_weights = false;
        debug!(bias_j, log_odds, "initialized bias");
        Ok(())
    }

    /// Recomputes cached scores and losses for the current weights.
    pub fn sync_model(&mut self) {
        let ctx = PassContext::new(&self.data, &self.config.regularizations, &*self.logger);
        self.grad_boost.sync_model_with_weights(&mut self.model, &ctx);
    }

    /// Runs `iterations` GradBoost passes.
    pub fn fit_model_weights(&mut self, iterations: usize) -> Result<()> {
        let ctx = PassContext::new(&self.data, &self.config.regularizations, &*self.logger);
        for _ in 0..iterations {
            self.grad_boost.make_one_pass(&mut self.model, &ctx)?;
        }
        Ok(())
    }

    /// Runs `iterations` SGD passes, then syncs the model.
    pub fn run_sgd(&mut self, iterations: usize, only_new_features: bool) -> Result<()> {
        self.sgd.set_training_mode(if only_new_features {
            TrainingMode::NewFeatures
        } else {
            TrainingMode::AllFeatures
        });
        let ctx = PassContext::new(&self.data, &self.config.regularizations, &*self.logger);
        for _ in 0..iterations {
            self.sgd.make_one_pass(&mut self.model, &ctx)?;
        }
        self.grad_boost.sync_model_with_weights(&mut self.model, &ctx);
        Ok(())
    }

    pub fn run_sgd_command(&mut self, command: SgdCommand) -> Result<()> {
        self.sync_model();
        self.sgd.run_command(&self.model, command, &*self.logger)?;
        Ok(())
    }

    /// AUC and lift of the current model on training and holdout.
    pub fn evaluate(&mut self) -> EvaluationLog {
        self.sync_model();
        let fractions = &self.config.lift_fractions;
        let holdout = self.data.holdout();
        let log = EvaluationLog {
            training: score_stats(self.data.training(), &self.model.training.wxs, fractions),
            holdout: (holdout.stats().row_count() > 0)
                .then(|| score_stats(holdout, &self.model.holdout.wxs, fractions)),
        };
        self.logger.add_to_logs(&LogRecord::Evaluation(log.clone()));
        log
    }

    /// Readable name of feature `j`: its factor names joined by `&`.
    pub fn describe_feature(&self, j: J) -> String {
        let product = self.product_map.j_to_feature(j);
        if product.is_bias() {
            return "bias".to_string();
        }
        product
            .js()
            .iter()
            .map(|&f| self.feature_map.j_to_feature(f).as_str())
            .collect::<Vec<_>>()
            .join(" & ")
    }

    pub fn log_stats(&self) {
        self.feature_map.log_stats("feature_map");
        self.product_map.log_stats("product_map");
        self.data.log_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_optimizer::MemoryLogger;

    fn new_world() -> (World, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        let config = TrainingConfig {
            deterministic: true,
            thread_count: 2,
            ..TrainingConfig::default()
        };
        let world = World::with_logger(config, logger.clone()).unwrap();
        (world, logger)
    }

    fn rows() -> Vec<LabeledRow> {
        vec![
            LabeledRow::new(["a", "b"], 1.0),
            LabeledRow::new(["a", "b"], 1.0),
            LabeledRow::new(["a"], -1.0),
            LabeledRow::new(["b"], -1.0),
        ]
    }

    #[test]
    fn test_add_rows_sizes_everything() {
        let (mut world, _) = new_world();
        let specs = [FeatureSpec::bias(), FeatureSpec::new([""])];
        world.add_rows(&rows(), &specs, DataSetKind::Training);
        assert_eq!(world.j_size(), 3);
        assert_eq!(world.model().size(), 3);
        assert_eq!(world.grad_boost().training_majorizer().size(), 3);
        assert_eq!(world.data().dependees().row_count(), 3);
        assert_eq!(world.data().training().stats().row_count(), 4);
        assert_eq!(world.data().training().data_files_bool_feature_count(), 6);
        assert_eq!(world.describe_feature(0), "bias");
    }

    #[test]
    fn test_product_exploration_and_pruning() {
        let (mut world, logger) = new_world();
        let specs = [FeatureSpec::bias(), FeatureSpec::new([""])];
        world.add_rows(&rows(), &specs, DataSetKind::Training);
        let a = world.product_map().get(&JProduct::single(0)).unwrap();
        let b = world.product_map().get(&JProduct::single(1)).unwrap();

        let log = world.add_product_features(&[(a, b), (b, a), (0, a)], Some(2));
        assert_eq!(log.features_added, 1);
        // (b, a) now exists; bias & a is just a.
        assert_eq!(log.present_features_skipped, 2);
        assert_eq!(log.xj_bools_added, 2);
        assert_eq!(world.j_size(), 4);
        assert_eq!(world.describe_feature(3), "a & b");
        assert_eq!(world.data().training().stats().positive(3), 2);

        let mut mask = vec![false; 4];
        mask[a as usize] = true;
        let pruned = world.remove_features(&mask);
        assert_eq!(pruned.features_left, 3);
        assert_eq!(world.model().size(), 3);
        assert_eq!(world.describe_feature(2), "a & b");
        // The product keeps its edge from b only.
        assert_eq!(world.data().dependees().edges(), vec![(1, 2)]);
        assert!(matches!(logger.last(), Some(LogRecord::FeaturePruning(_))));
    }

    #[test]
    fn test_too_large_products_are_skipped() {
        let (mut world, _) = new_world();
        world.add_rows(&rows(), &[FeatureSpec::new([""])], DataSetKind::Training);
        let log = world.add_product_features(&[(0, 1)], Some(1));
        assert_eq!(log.too_large_features_skipped, 1);
        assert_eq!(log.features_added, 0);
        assert_eq!(world.j_size(), 2);
    }

    #[test]
    fn test_initialize_bias() {
        let (mut world, _) = new_world();
        world.add_rows(&rows(), &[FeatureSpec::new([""])], DataSetKind::Training);
        assert!(matches!(world.initialize_bias(), Err(TrainingError::MissingBias)));

        let (mut world, _) = new_world();
        world.add_rows(&rows(), &[FeatureSpec::bias()], DataSetKind::Training);
        world.initialize_bias().unwrap();
        // Two positives, two negatives.
        assert_eq!(world.model().w, vec![0.0]);
        assert!(!world.model().synced_with_weights);
    }

    #[test]
    fn test_remove_features_in_set() {
        let (mut world, _) = new_world();
        let specs = [FeatureSpec::bias(), FeatureSpec::new([""])];
        world.add_rows(&rows(), &specs, DataSetKind::Training);
        world.add_product_features(&[(1, 2)], None);
        let log = world.remove_features_in_set(&FeatureSet::explicit(["a"]));
        // a and a & b go, bias and b stay.
        assert_eq!(log.features_removed, 2);
        assert_eq!(world.j_size(), 2);
        assert_eq!(world.describe_feature(1), "b");
        assert!(!world.data().dependees().has_edges());
    }

    #[test]
    fn test_no_op_renumbering_keeps_sync() {
        let (mut world, _) = new_world();
        world.add_rows(&rows(), &[FeatureSpec::bias()], DataSetKind::Training);
        world.sync_model();
        world.remove_and_renumber(&JRenumbering::identity(1));
        assert!(world.model().synced_with_weights);
    }
}
