//! Training and holdout data sets.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use sensei_core::concurrency::{ObjectPool, WorkerPool};
use sensei_core::{JRenumbering, Renumber, J};
use tracing::info;

use crate::dependees::DependencyGraph;
use crate::row_extender::RowExtender;
use crate::shard::{Shard, ShardBuilder};
use crate::stats::Stats;

/// Default shard size limit in stored non-zeros.
pub const DEFAULT_MAX_SHARD_SIZE: u64 = 1 << 20;

/// A set of shards with aggregate [`Stats`].
///
/// Stats are only as fresh as the last [`ShardSet::recalc_stats`].
#[derive(Debug)]
pub struct ShardSet {
    shards: Vec<Shard>,
    stats: Stats,
    data_files_bool_feature_count: u64,
    max_shard_size: u64,
    workers: WorkerPool,
}

impl Default for ShardSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardSet {
    pub fn new() -> Self {
        Self {
            shards: Vec::new(),
            stats: Stats::new(0),
            data_files_bool_feature_count: 0,
            max_shard_size: DEFAULT_MAX_SHARD_SIZE,
            workers: WorkerPool::default(),
        }
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn shards_mut(&mut self) -> &mut Vec<Shard> {
        &mut self.shards
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn workers(&self) -> WorkerPool {
        self.workers
    }

    pub fn set_workers(&mut self, workers: WorkerPool) {
        self.workers = workers;
    }

    pub fn max_shard_size(&self) -> u64 {
        self.max_shard_size
    }

    pub fn set_max_shard_size(&mut self, max_shard_size: u64) {
        self.max_shard_size = max_shard_size;
    }

    /// Builder producing shards sized for this set.
    pub fn shard_builder(&self) -> ShardBuilder {
        ShardBuilder::new(self.max_shard_size)
    }

    /// Rows over all shards.
    pub fn row_count(&self) -> u64 {
        self.shards.iter().map(|s| s.row_count() as u64).sum()
    }

    pub fn size_bytes(&self) -> u64 {
        self.shards.iter().map(Shard::size_bytes).sum()
    }

    /// Stored non-zeros over all shards.
    pub fn xj_bool_count(&self) -> u64 {
        self.shards.iter().map(Shard::xj_bool_count).sum()
    }

    pub fn xj_bool_count_of_j(&self, j: J) -> u64 {
        self.stats.xj_bool_count_of_j(j)
    }

    pub fn add_to_data_files_bool_feature_count(&mut self, count: u64) {
        self.data_files_bool_feature_count += count;
    }

    pub fn data_files_bool_feature_count(&self) -> u64 {
        self.data_files_bool_feature_count
    }

    /// Recounts [`Stats`] for `new_size` features over materialized rows.
    ///
    /// Shards are counted in parallel into at most one accumulator per
    /// worker, then merged.
    pub fn recalc_stats(&mut self, new_size: usize, dependees: &DependencyGraph) {
        let pool = ObjectPool::new(self.workers.thread_count(), move || Stats::new(new_size));
        self.workers.par_for(&self.shards, false, |shard: &Shard| {
            let mut stats = pool.get();
            let mut row = RowExtender::new(dependees);
            for i in 0..shard.row_count() {
                shard.reset_extender(i, &mut row);
                stats.add_row(&row);
            }
            pool.release(stats);
        });
        assert_eq!(pool.num_grabbed(), 0);

        self.stats.reset(new_size);
        for stats in pool.drain_available() {
            self.stats.add(&stats);
            pool.retire(stats);
        }
    }

    /// `size x size` table of how many materialized rows have both `j1` and
    /// `j2` active.
    pub fn coincidence_matrix(&self, size: usize, dependees: &DependencyGraph) -> Vec<Vec<u32>> {
        let coincidence: Vec<AtomicU32> = (0..size * size).map(|_| AtomicU32::new(0)).collect();
        self.workers.par_for(&self.shards, false, |shard: &Shard| {
            let mut row = RowExtender::new(dependees);
            for i in 0..shard.row_count() {
                shard.reset_extender(i, &mut row);
                for &j1 in row.sparse_bool() {
                    assert!((j1 as usize) < size, "feature {j1} outside coincidence matrix");
                    for &j2 in row.sparse_bool() {
                        coincidence[j1 as usize * size + j2 as usize]
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        coincidence
            .chunks(size.max(1))
            .take(size)
            .map(|row| row.iter().map(|c| c.load(Ordering::Relaxed)).collect())
            .collect()
    }

    pub fn log_stats(&self, name: &str) {
        info!(
            data_set = name,
            rows = self.stats.row_count(),
            shards = self.shards.len(),
            size_bytes = self.size_bytes(),
            data_files_bool_feature_count = self.data_files_bool_feature_count,
            xj_bool_count = self.xj_bool_count(),
            "shard set stats"
        );
    }
}

impl Renumber for ShardSet {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_empty() {
            return;
        }
        self.workers.par_for(self.shards.iter_mut(), false, |shard| {
            shard.remove_and_renumber_js(renumbering);
        });
        self.stats.remove_and_renumber_js(renumbering);
    }
}

/// Appends shards to a [`ShardSet`] from many ingesting threads.
#[derive(Debug)]
pub struct ShardAdder<'a> {
    target: Mutex<&'a mut ShardSet>,
}

impl<'a> ShardAdder<'a> {
    pub fn new(target: &'a mut ShardSet) -> Self {
        Self {
            target: Mutex::new(target),
        }
    }

    /// Moves every shard of `builder` into the set.
    pub fn add(&self, data_files_bool_feature_count: u64, builder: ShardBuilder) {
        let mut target = self.target.lock();
        target.shards_mut().extend(builder.into_shards());
        target.add_to_data_files_bool_feature_count(data_files_bool_feature_count);
    }
}

/// Training and holdout sets sharing one dependency graph.
#[derive(Debug, Default)]
pub struct Data {
    training: ShardSet,
    holdout: ShardSet,
    dependees: DependencyGraph,
}

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn training(&self) -> &ShardSet {
        &self.training
    }

    pub fn holdout(&self) -> &ShardSet {
        &self.holdout
    }

    pub fn training_mut(&mut self) -> &mut ShardSet {
        &mut self.training
    }

    pub fn holdout_mut(&mut self) -> &mut ShardSet {
        &mut self.holdout
    }

    pub fn dependees(&self) -> &DependencyGraph {
        &self.dependees
    }

    pub fn dependees_mut(&mut self) -> &mut DependencyGraph {
        &mut self.dependees
    }

    pub fn set_max_shard_size(&mut self, max_shard_size: u64) {
        self.training.set_max_shard_size(max_shard_size);
        self.holdout.set_max_shard_size(max_shard_size);
    }

    pub fn set_workers(&mut self, workers: WorkerPool) {
        self.training.set_workers(workers);
        self.holdout.set_workers(workers);
    }

    pub fn recalc_stats(&mut self, j_size: usize) {
        self.training.recalc_stats(j_size, &self.dependees);
        self.holdout.recalc_stats(j_size, &self.dependees);
    }

    /// Rows with `j` active, training plus holdout.
    pub fn xj_bool_count_of_j(&self, j: J) -> u64 {
        self.training.xj_bool_count_of_j(j) + self.holdout.xj_bool_count_of_j(j)
    }

    pub fn materialized_xj_bool_count(&self) -> u64 {
        self.training.stats().materialized_xj_bool_count()
            + self.holdout.stats().materialized_xj_bool_count()
    }

    /// `xj_bool_count_of_j` for every feature in the dependency graph.
    pub fn detailed_xj_bool_counts(&self) -> Vec<u64> {
        (0..self.dependees.row_count())
            .map(|j| self.xj_bool_count_of_j(j as J))
            .collect()
    }

    pub fn log_stats(&self) {
        self.training.log_stats("training");
        self.holdout.log_stats("holdout");
    }
}

impl Renumber for Data {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        self.training.remove_and_renumber_js(renumbering);
        self.holdout.remove_and_renumber_js(renumbering);
        self.dependees.remove_and_renumber_js(renumbering);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(rows: &[(&[J], f64)]) -> Shard {
        let mut shard = Shard::new();
        for (id, (js, y)) in rows.iter().enumerate() {
            shard.add_row(js, *y, id as u32);
        }
        shard
    }

    fn small_data() -> Data {
        let mut data = Data::new();
        data.set_workers(WorkerPool::new(2));
        data.training_mut().shards_mut().push(shard(&[(&[0, 1], 1.0), (&[1], -1.0)]));
        data.training_mut().shards_mut().push(shard(&[(&[0], 1.0), (&[0, 1], -1.0)]));
        data.holdout_mut().shards_mut().push(shard(&[(&[1], 1.0)]));
        data
    }

    #[test]
    fn test_recalc_stats_matches_sequential_count() {
        let mut data = small_data();
        data.recalc_stats(2);
        let stats = data.training().stats();
        assert_eq!(stats.row_count(), 4);
        assert_eq!(stats.positive(0), 2);
        assert_eq!(stats.negative(0), 1);
        assert_eq!(stats.positive(1), 1);
        assert_eq!(stats.negative(1), 2);
        assert_eq!(data.xj_bool_count_of_j(1), 4);
        assert_eq!(data.materialized_xj_bool_count(), 7);
    }

    #[test]
    fn test_recalc_stats_sees_products() {
        let mut data = small_data();
        data.dependees_mut().set_row_count(3);
        data.dependees_mut().extend(&[(0, 2), (1, 2)]);
        data.recalc_stats(3);
        let stats = data.training().stats();
        assert_eq!(stats.xj_bool_count_of_j(2), 2);
        assert_eq!(data.detailed_xj_bool_counts(), vec![3, 4, 2]);
    }

    #[test]
    fn test_coincidence_matrix() {
        let data = small_data();
        let m = data.training().coincidence_matrix(2, data.dependees());
        assert_eq!(m, vec![vec![3, 2], vec![2, 3]]);
    }

    #[test]
    fn test_renumber_shards_and_stats() {
        let mut data = small_data();
        data.dependees_mut().set_row_count(2);
        data.recalc_stats(2);
        data.remove_and_renumber_js(&JRenumbering::remove_js(&[true, false]));
        assert_eq!(data.training().shards()[0].row(0), &[0]);
        assert_eq!(data.training().stats().size(), 1);
        assert_eq!(data.dependees().row_count(), 1);
        data.recalc_stats(1);
        assert_eq!(data.training().stats().xj_bool_count_of_j(0), 3);
    }

    #[test]
    fn test_shard_adder_from_threads() {
        let mut set = ShardSet::new();
        set.set_max_shard_size(2);
        {
            let adder = ShardAdder::new(&mut set);
            std::thread::scope(|s| {
                for t in 0..4u32 {
                    let adder = &adder;
                    s.spawn(move || {
                        let mut builder = ShardBuilder::new(2);
                        // Three rows of two non-zeros: one shard each.
                        for i in 0..3 {
                            builder.add_row(&[0, 1], 1.0, t * 10 + i);
                        }
                        adder.add(6, builder);
                    });
                }
            });
        }
        assert_eq!(set.shards().len(), 12);
        assert_eq!(set.row_count(), 12);
        assert_eq!(set.data_files_bool_feature_count(), 24);
    }
}
