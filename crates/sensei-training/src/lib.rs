//! Training runs over a growing feature set.
//!
//! A [`World`] owns the feature maps, the training and holdout data, the
//! model and both optimizers, and keeps them consistent as features come
//! and go:
//!
//! - [`World::add_rows`] ingests [`LabeledRow`]s, creating product features
//!   according to [`FeatureSpec`]s.
//! - [`World::add_product_features`] conjoins existing features; the new
//!   products are materialized from their factors through the dependency
//!   graph instead of being stored in the rows.
//! - [`World::remove_features`] prunes and renumbers every id-indexed
//!   structure at once.
//! - [`World::fit_model_weights`] and [`World::run_sgd`] move the weights,
//!   and [`World::evaluate`] reports AUC and lift.
//!
//! Behavior is driven by a [`TrainingConfig`], usually loaded from JSON.
//!
//! # Example
//!
//! ```
//! use sensei_training::{DataSetKind, FeatureSpec, LabeledRow, TrainingConfig, World};
//!
//! let config = TrainingConfig::from_json(r#"{ "deterministic": true, "lift_fractions": [0.5] }"#)
//!     .unwrap();
//! let mut world = World::new(config).unwrap();
//!
//! let specs = [FeatureSpec::bias(), FeatureSpec::new(["color:"])];
//! let rows = vec![
//!     LabeledRow::new(["color:red"], 1.0),
//!     LabeledRow::new(["color:red"], 1.0),
//!     LabeledRow::new(["color:blue"], -1.0),
//!     LabeledRow::new(["color:blue"], -1.0),
//! ];
//! world.add_rows(&rows, &specs, DataSetKind::Training);
//! world.initialize_bias().unwrap();
//! world.fit_model_weights(10).unwrap();
//!
//! let evaluation = world.evaluate();
//! assert_eq!(evaluation.training.auc, Some(1.0));
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod ingest;
pub mod world;

pub use config::TrainingConfig;
pub use error::{Result, TrainingError};
pub use evaluation::{auc_and_lift, score_stats};
pub use ingest::{FeatureSpec, LabeledRow, RowIngestor};
pub use world::{DataSetKind, World};
