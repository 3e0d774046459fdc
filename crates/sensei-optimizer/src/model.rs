//! Per-feature model state shared by both optimizers.

use sensei_core::{JRenumbering, Renumber, J};

/// Cached per-row values of one data set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerShard {
    /// `w . x` of every row, in shard order.
    pub wxs: Vec<f64>,
}

impl PerShard {
    pub fn init(&mut self, row_count: usize) {
        self.wxs.resize(row_count, 0.0);
        self.wxs.shrink_to_fit();
    }
}

/// Weights and their companions, one slot per feature id.
///
/// `synced_with_weights` says whether the cached dot products, majorizers and
/// losses reflect the current `w`. Optimizers clear it whenever they move
/// `w`.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub precision: Vec<f64>,
    pub w: Vec<f64>,
    pub delta_w: Vec<f64>,
    pub loss_derivative: Vec<f64>,
    /// Value of `current_creation_time` when each slot was created.
    pub creation_time: Vec<u32>,
    pub current_creation_time: u32,
    /// Total loss at the previous weights, `w - delta_w`.
    pub prev_total_loss: f64,
    pub total_loss: f64,
    pub synced_with_weights: bool,
    /// Passes over the data by any optimizer, undone ones included.
    pub iteration_no: u32,
    pub training: PerShard,
    pub holdout: PerShard,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            precision: Vec::new(),
            w: Vec::new(),
            delta_w: Vec::new(),
            loss_derivative: Vec::new(),
            creation_time: Vec::new(),
            current_creation_time: 0,
            prev_total_loss: f64::INFINITY,
            total_loss: f64::INFINITY,
            synced_with_weights: false,
            iteration_no: 0,
            training: PerShard::default(),
            holdout: PerShard::default(),
        }
    }
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.w.is_empty()
    }

    /// Resizes every per-feature vector and starts a new creation epoch;
    /// slots added now are the "new" features until the next call.
    pub fn set_size(&mut self, size: usize) {
        let old_size = self.size();
        self.current_creation_time += 1;
        self.precision.resize(size, 0.0);
        self.w.resize(size, 0.0);
        self.delta_w.resize(size, 0.0);
        self.loss_derivative.resize(size, 0.0);
        self.creation_time.resize(size, 0);
        for t in self.creation_time.iter_mut().skip(old_size) {
            *t = self.current_creation_time;
        }
    }

    /// Moves the current total into `prev_total_loss`.
    pub fn set_total_loss(&mut self, total_loss: f64) {
        self.prev_total_loss = self.total_loss;
        self.total_loss = total_loss;
    }

    pub fn init_per_shards(&mut self, training_rows: usize, holdout_rows: usize) {
        self.training.init(training_rows);
        self.holdout.init(holdout_rows);
    }

    /// True if `j` was created by the latest [`Model::set_size`].
    pub fn is_feature_new(&self, j: J) -> bool {
        self.creation_time[j as usize] == self.current_creation_time
    }

    /// Folds the weight of `from` into `to`.
    pub fn merge_j_to_j(&mut self, from: J, to: J) {
        let (from, to) = (from as usize, to as usize);
        self.w[to] += self.w[from];
        self.w[from] = 0.0;
        self.delta_w[to] += self.delta_w[from];
        self.delta_w[from] = 0.0;
        self.synced_with_weights = false;
    }
}

impl Renumber for Model {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        renumbering.renumber_indices(&mut self.precision);
        renumbering.renumber_indices(&mut self.w);
        renumbering.renumber_indices(&mut self.delta_w);
        renumbering.renumber_indices(&mut self.loss_derivative);
        renumbering.renumber_indices(&mut self.creation_time);
    }
}
