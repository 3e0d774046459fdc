//! SGD reproducibility and convergence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sensei_core::concurrency::WorkerPool;
use sensei_core::J;
use sensei_data::{Data, Shard, ShardBuilder};
use sensei_optimizer::{
    GradBoost, MemoryLogger, Model, Optimizer, PassContext, Regularizations, Sgd, SgdCommand,
    SgdSchedule,
};

const SIZE: usize = 8;

/// Rows where feature 0 predicts the label and the rest are noise.
fn random_data(seed: u64) -> Data {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = ShardBuilder::new(50);
    for id in 0..400u32 {
        let y = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let mut js: Vec<J> = Vec::new();
        if (y > 0.0) == rng.gen_bool(0.9) {
            js.push(0);
        }
        js.extend((1..SIZE as J).filter(|_| rng.gen_bool(0.3)));
        builder.add_row(&js, y, id);
    }
    let mut data = Data::new();
    data.training_mut().shards_mut().extend(builder.into_shards());
    data.dependees_mut().set_row_count(SIZE);
    data.recalc_stats(SIZE);
    data
}

fn train(data: &Data, deterministic: bool, passes: usize) -> Vec<f64> {
    let regs = Regularizations::standard(0.01, 0.01);
    let logger = MemoryLogger::new();
    let ctx = PassContext::new(data, &regs, &logger);
    let mut model = Model::new();
    model.set_size(SIZE);
    let mut sgd = Sgd::with_workers(WorkerPool::new(4));
    sgd.set_size(SIZE);
    sgd.set_deterministic(deterministic);
    sgd.set_learning_rate_schedule(SgdSchedule {
        start_learning_rate: Some(0.05),
        decay_speed: Some(0.5),
    });
    for _ in 0..passes {
        sgd.make_one_pass(&mut model, &ctx).unwrap();
    }
    model.w
}

#[test]
fn test_deterministic_sgd_is_bit_identical() {
    let data = random_data(3);
    assert!(data.training().shards().len() > 1);
    let first = train(&data, true, 5);
    let second = train(&data, true, 5);
    let bits = |w: &[f64]| w.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first), bits(&second));
    assert!(first[0] > 0.5);
}

#[test]
fn test_parallel_sgd_stays_close_to_sequential() {
    let data = random_data(5);
    let sequential = train(&data, true, 10);
    let parallel = train(&data, false, 10);
    for (a, b) in sequential.iter().zip(&parallel) {
        assert!((a - b).abs() < 0.3, "{a} vs {b}");
    }
}

#[test]
fn test_sgd_then_grad_boost_sync_and_reduce() {
    let data = random_data(7);
    let regs = Regularizations::standard(0.0, 0.01);
    let logger = MemoryLogger::new();
    let ctx = PassContext::new(&data, &regs, &logger);

    let mut model = Model::new();
    model.set_size(SIZE);
    let mut grad_boost = GradBoost::new();
    grad_boost.set_size(SIZE);
    let mut sgd = Sgd::new();
    sgd.set_size(SIZE);
    sgd.set_learning_rate_schedule(SgdSchedule {
        start_learning_rate: Some(10.0),
        decay_speed: None,
    });

    grad_boost.sync_model_with_weights(&mut model, &ctx);
    sgd.run_command(&model, SgdCommand::StoreTotalLoss, &logger)
        .unwrap();
    sgd.make_one_pass(&mut model, &ctx).unwrap();
    assert!(!model.synced_with_weights);
    grad_boost.sync_model_with_weights(&mut model, &ctx);
    sgd.run_command(&model, SgdCommand::MaybeReduce { factor: 0.5 }, &logger)
        .unwrap();

    let expected = if model.total_loss > model.prev_total_loss { 5.0 } else { 10.0 };
    assert_eq!(sgd.start_learning_rate(), Some(expected));
}

#[test]
fn test_empty_shard_is_harmless() {
    let mut data = random_data(9);
    data.training_mut().shards_mut().push(Shard::new());
    let w = train(&data, true, 2);
    assert_eq!(w.len(), SIZE);
    assert!(w.iter().all(|x| x.is_finite()));
}
