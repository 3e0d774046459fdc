//! Trains a Sensei model on synthetic rows.
//!
//! Fits the single features first, then runs rounds of product exploration
//! (every pair of features from different groups) followed by refitting and
//! pruning of zero-weight features. With some L1 the planted interaction
//! survives and the rest is pruned.

use std::path::PathBuf;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sensei_core::J;
use sensei_demos::SyntheticTask;
use sensei_optimizer::{ScoreStats, SgdCommand};
use sensei_training::{DataSetKind, TrainingConfig, World};

#[derive(Parser, Debug)]
struct Args {
    /// JSON training config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 10_000)]
    rows: usize,

    #[arg(long, default_value_t = 2_000)]
    holdout_rows: usize,

    #[arg(long, default_value_t = 4)]
    groups: usize,

    #[arg(long, default_value_t = 5)]
    values: usize,

    /// Label flip probability.
    #[arg(long, default_value_t = 0.05)]
    noise: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// GradBoost passes per fit.
    #[arg(long, default_value_t = 20)]
    passes: usize,

    #[arg(long, default_value_t = 1)]
    explore_rounds: usize,

    #[arg(long, default_value_t = 2)]
    max_product_size: usize,

    /// Base L1 regularization, overriding the config.
    #[arg(long)]
    l1: Option<f64>,

    /// SGD passes on the explored features; needs a start learning rate.
    #[arg(long, default_value_t = 0)]
    sgd_passes: usize,

    #[arg(long)]
    sgd_learning_rate: Option<f64>,
}

fn group_of(name: &str) -> &str {
    name.split_once(':').map_or(name, |(group, _)| group)
}

/// Pairs of features whose factors come from disjoint groups.
fn candidate_pairs(world: &World) -> Vec<(J, J)> {
    let features: Vec<(J, Vec<String>)> = world
        .product_map()
        .all()
        .filter(|(_, product)| !product.is_bias())
        .map(|(j, product)| {
            let groups = product
                .js()
                .iter()
                .map(|&f| group_of(world.feature_map().j_to_feature(f).as_str()).to_string())
                .collect();
            (j, groups)
        })
        .collect();
    let mut pairs = Vec::new();
    for (i, (a, a_groups)) in features.iter().enumerate() {
        for (b, b_groups) in &features[i + 1..] {
            if a_groups.iter().all(|g| !b_groups.contains(g)) {
                pairs.push((*a, *b));
            }
        }
    }
    pairs
}

fn log_evaluation(stage: &str, training: &ScoreStats, holdout: Option<&ScoreStats>) {
    tracing::info!(
        stage,
        training_auc = ?training.auc,
        holdout_auc = ?holdout.and_then(|h| h.auc),
        "evaluation"
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_file(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(l1) = args.l1 {
        config.regularizations.base.l1 = l1;
    }
    if args.sgd_learning_rate.is_some() {
        config.sgd.start_learning_rate = args.sgd_learning_rate;
    }
    if config.lift_fractions.is_empty() {
        config.lift_fractions = vec![0.01, 0.1];
    }

    if !(args.groups >= 2 && args.values >= 2 && (0.0..0.5).contains(&args.noise)) {
        anyhow::bail!("need at least 2 groups and 2 values, and noise in [0, 0.5)");
    }
    let task = SyntheticTask::new(args.groups, args.values, args.noise);
    let mut rng = StdRng::seed_from_u64(args.seed);
    let specs = task.specs();

    let mut world = World::new(config)?;
    world.add_rows(&task.generate(&mut rng, args.rows), &specs, DataSetKind::Training);
    world.add_rows(&task.generate(&mut rng, args.holdout_rows), &specs, DataSetKind::Holdout);
    world.log_stats();

    world.initialize_bias()?;
    world.fit_model_weights(args.passes)?;
    let evaluation = world.evaluate();
    log_evaluation("single features", &evaluation.training, evaluation.holdout.as_ref());

    for round in 0..args.explore_rounds {
        let pairs = candidate_pairs(&world);
        let exploration = world.add_product_features(&pairs, Some(args.max_product_size));
        tracing::info!(
            round,
            candidates = pairs.len(),
            added = exploration.features_added,
            "explored"
        );

        world.fit_model_weights(args.passes)?;
        // Factors of surviving products stay, or the products would never fire.
        let bias_j = world.product_map().bias_j();
        let dependees = world.data().dependees();
        let mask: Vec<bool> = world
            .model()
            .w
            .iter()
            .enumerate()
            .map(|(j, &w)| {
                let j = j as J;
                w == 0.0 && Some(j) != bias_j && dependees.children(j).is_empty()
            })
            .collect();
        let pruning = world.remove_features(&mask);
        tracing::info!(
            round,
            removed = pruning.features_removed,
            left = pruning.features_left,
            "pruned"
        );
        world.fit_model_weights(args.passes)?;
    }

    if args.sgd_passes > 0 {
        world.run_sgd_command(SgdCommand::StoreTotalLoss)?;
        world.run_sgd(args.sgd_passes, false)?;
        world.run_sgd_command(SgdCommand::MaybeReduce { factor: 0.5 })?;
    }

    let evaluation = world.evaluate();
    log_evaluation("final", &evaluation.training, evaluation.holdout.as_ref());

    let mut weights: Vec<(f64, String)> = world
        .model()
        .w
        .iter()
        .enumerate()
        .map(|(j, &w)| (w, world.describe_feature(j as J)))
        .collect();
    weights.sort_by(|a, b| b.0.abs().total_cmp(&a.0.abs()));
    for (w, name) in weights.iter().take(10) {
        tracing::info!(weight = w, feature = %name, "top feature");
    }
    let [a, b] = task.planted_pair();
    tracing::info!(planted = %format!("{a} & {b}"), "synthetic_train finished");
    Ok(())
}
