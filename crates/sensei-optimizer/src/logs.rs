//! Structured per-pass records.
//!
//! Every optimizer pass and every change to the feature set produces exactly
//! one [`LogRecord`], handed to a [`PassLogger`].

use parking_lot::Mutex;
use sensei_core::util::{l1_norm, l2_norm_squared, non_zero_count};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Summary of a dense vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorStats {
    pub size: u64,
    pub l1: f64,
    /// Squared L2 norm.
    pub l2: f64,
    pub nonzero_count: u64,
}

impl VectorStats {
    pub fn of(v: &[f64]) -> Self {
        Self {
            size: v.len() as u64,
            l1: l1_norm(v),
            l2: l2_norm_squared(v),
            nonzero_count: non_zero_count(v),
        }
    }
}

/// Loss of a model on one data set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSetStats {
    /// Rows.
    pub size: u64,
    pub loss: f64,
    /// Stats of the loss derivative with respect to `w`.
    pub dloss: VectorStats,
}

/// State after a GradBoost sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub index: u32,
    /// Dependee edges walked while materializing training and holdout rows.
    pub cpu_operation_count_flat_materialization: u64,
    /// Edges a fully recursive materialization would walk.
    pub cpu_operation_count_deep_materialization: u64,
    pub weight_stats: VectorStats,
    pub delta_weight_stats: VectorStats,
    pub training_data_stats: DataSetStats,
    pub holdout_data_stats: Option<DataSetStats>,
    pub regularization_loss: f64,
    pub prev_total_loss: f64,
    pub total_loss: f64,
}

/// Outcome of one GradBoost weight update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateMinimumLog {
    pub undo_iteration: bool,
    pub restart_iteration: bool,
    pub dot_loss_derivative_vs_delta_weight: f64,
    pub cos_angle_loss_derivative_vs_delta_weight: Option<f64>,
}

/// Outcome of an SGD `maybe_reduce` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SgdLearningRateLog {
    pub previous_total_loss: f64,
    pub current_total_loss: f64,
    /// Set only when the rate was reduced.
    pub previous_learning_rate: Option<f64>,
    pub current_learning_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureExplorationLog {
    pub features_added: u64,
    pub present_features_skipped: u64,
    pub too_large_features_skipped: u64,
    pub xj_bools_added: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturePruningLog {
    pub features_removed: u64,
    pub features_left: u64,
}

/// Lift of the top `fraction` of rows by score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiftAt {
    pub fraction: f64,
    pub lift: Option<f64>,
}

/// Ranking quality of the model on one data set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub auc: Option<f64>,
    pub lifts: Vec<LiftAt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationLog {
    pub training: ScoreStats,
    pub holdout: Option<ScoreStats>,
}

/// One structured log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRecord {
    Iteration(IterationLog),
    UpdateMinimum(UpdateMinimumLog),
    SgdLearningRate(SgdLearningRateLog),
    FeatureExploration(FeatureExplorationLog),
    FeaturePruning(FeaturePruningLog),
    Evaluation(EvaluationLog),
}

impl LogRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            LogRecord::Iteration(_) => "iteration",
            LogRecord::UpdateMinimum(_) => "update_minimum",
            LogRecord::SgdLearningRate(_) => "sgd_learning_rate",
            LogRecord::FeatureExploration(_) => "feature_exploration",
            LogRecord::FeaturePruning(_) => "feature_pruning",
            LogRecord::Evaluation(_) => "evaluation",
        }
    }
}

/// Sink for [`LogRecord`]s.
pub trait PassLogger: Send + Sync {
    fn add_to_logs(&self, record: &LogRecord);
}

/// Emits each record as a `tracing` event with a JSON payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl PassLogger for TracingLogger {
    fn add_to_logs(&self, record: &LogRecord) {
        match serde_json::to_string(record) {
            Ok(json) => info!(kind = record.kind(), record = %json, "pass log"),
            Err(err) => warn!(kind = record.kind(), error = %err, "unserializable pass log"),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<LogRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn iterations(&self) -> Vec<IterationLog> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                LogRecord::Iteration(log) => Some(log.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn update_minimums(&self) -> Vec<UpdateMinimumLog> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                LogRecord::UpdateMinimum(log) => Some(*log),
                _ => None,
            })
            .collect()
    }
}

impl PassLogger for MemoryLogger {
    fn add_to_logs(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_stats() {
        let stats = VectorStats::of(&[1.0, -2.0, 0.0]);
        assert_eq!(stats.size, 3);
        assert_eq!(stats.l1, 3.0);
        assert_eq!(stats.l2, 5.0);
        assert_eq!(stats.nonzero_count, 2);
    }

    #[test]
    fn test_memory_logger_filters() {
        let logger = MemoryLogger::new();
        logger.add_to_logs(&LogRecord::Iteration(IterationLog::default()));
        logger.add_to_logs(&LogRecord::UpdateMinimum(UpdateMinimumLog {
            undo_iteration: true,
            ..UpdateMinimumLog::default()
        }));
        assert_eq!(logger.len(), 2);
        assert_eq!(logger.iterations().len(), 1);
        assert!(logger.update_minimums()[0].undo_iteration);
        assert_eq!(logger.last().map(|r| r.kind()), Some("update_minimum"));
        logger.clear();
        assert!(logger.is_empty());
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = LogRecord::FeaturePruning(FeaturePruningLog {
            features_removed: 2,
            features_left: 5,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["feature_pruning"]["features_left"], 5);
        TracingLogger.add_to_logs(&record);
    }
}
