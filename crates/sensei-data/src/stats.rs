//! Per-feature label counters.

use sensei_core::util::hash64;
use sensei_core::{JRenumbering, Renumber, J};

use crate::row_extender::RowExtender;

/// Per-feature positive and negative row counts plus an XOR checksum of the
/// ids of the rows each feature is active in.
///
/// Counts are over materialized rows, so product features are included.
/// Merging two `Stats` is order independent, which lets shards be counted in
/// parallel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    positive_row_count: u64,
    negative_row_count: u64,
    positive: Vec<u64>,
    negative: Vec<u64>,
    hash: Vec<u64>,
}

/// 2x2 contingency table of one feature against the label.
///
/// Index 0 is "absent" / "negative", index 1 is "present" / "positive".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationTable {
    pub n: u64,
    pub n_y: [u64; 2],
    pub n_x: [u64; 2],
    pub n_xy: [[u64; 2]; 2],
}

impl CorrelationTable {
    pub fn mutual_information(&self) -> f64 {
        debug_assert!(self.n > 0);
        let n = self.n as f64;
        let mut ret = 0.0;
        for x in 0..2 {
            for y in 0..2 {
                let p_xy = self.n_xy[x][y] as f64 / n;
                let p_x = self.n_x[x] as f64 / n;
                let p_y = self.n_y[y] as f64 / n;
                if p_xy != 0.0 {
                    ret += p_xy * (p_xy / (p_x * p_y)).ln();
                }
            }
        }
        ret
    }

    pub fn phi_coefficient(&self) -> f64 {
        let den = self.n_x[0] as f64 * self.n_x[1] as f64 * self.n_y[0] as f64 * self.n_y[1] as f64;
        if den == 0.0 {
            return 0.0;
        }
        let nom = self.n_xy[1][1] as f64 * self.n_xy[0][0] as f64
            - self.n_xy[1][0] as f64 * self.n_xy[0][1] as f64;
        nom / den.sqrt()
    }
}

impl Stats {
    pub fn new(size: usize) -> Self {
        let mut stats = Self::default();
        stats.reset(size);
        stats
    }

    pub fn size(&self) -> usize {
        debug_assert_eq!(self.positive.len(), self.hash.len());
        debug_assert_eq!(self.negative.len(), self.hash.len());
        self.hash.len()
    }

    /// Zeroes every counter and resizes to `new_size` features.
    pub fn reset(&mut self, new_size: usize) {
        self.positive_row_count = 0;
        self.negative_row_count = 0;
        self.positive = vec![0; new_size];
        self.negative = vec![0; new_size];
        self.hash = vec![0; new_size];
    }

    /// Merges `src` into `self`.
    pub fn add(&mut self, src: &Stats) {
        assert_eq!(src.size(), self.size(), "merging stats of different sizes");
        self.positive_row_count += src.positive_row_count;
        self.negative_row_count += src.negative_row_count;
        for j in 0..src.size() {
            self.positive[j] += src.positive[j];
            self.negative[j] += src.negative[j];
            self.hash[j] ^= src.hash[j];
        }
    }

    /// Counts one materialized row. `y == 1` is positive, anything else
    /// negative.
    pub fn add_row(&mut self, row: &RowExtender<'_>) {
        let counts = if row.y() == 1.0 {
            self.positive_row_count += 1;
            &mut self.positive
        } else {
            self.negative_row_count += 1;
            &mut self.negative
        };
        let row_hash = hash64(row.id());
        for &j in row.sparse_bool() {
            let j = j as usize;
            assert!(j < counts.len(), "feature {j} outside stats of size {}", counts.len());
            counts[j] += 1;
            self.hash[j] ^= row_hash;
        }
    }

    pub fn correlation_table(&self, j: J) -> CorrelationTable {
        let neg = self.negative(j);
        let pos = self.positive(j);
        let n_xy = [
            [self.negative_row_count - neg, self.positive_row_count - pos],
            [neg, pos],
        ];
        let n_x = [n_xy[0][0] + n_xy[0][1], n_xy[1][0] + n_xy[1][1]];
        let n_y = [n_xy[0][0] + n_xy[1][0], n_xy[0][1] + n_xy[1][1]];
        CorrelationTable {
            n: n_x[0] + n_x[1],
            n_y,
            n_x,
            n_xy,
        }
    }

    /// `ln(positive / negative)` with zero counts floored to 1.
    pub fn log_odds(&self, j: J) -> f64 {
        let pos = self.positive(j).max(1) as f64;
        let neg = self.negative(j).max(1) as f64;
        (pos / neg).ln()
    }

    /// Total number of (row, active feature) pairs.
    pub fn materialized_xj_bool_count(&self) -> u64 {
        self.positive.iter().sum::<u64>() + self.negative.iter().sum::<u64>()
    }

    pub fn positive(&self, j: J) -> u64 {
        self.positive[j as usize]
    }

    pub fn negative(&self, j: J) -> u64 {
        self.negative[j as usize]
    }

    /// Rows in which `j` is active.
    pub fn xj_bool_count_of_j(&self, j: J) -> u64 {
        self.positive(j) + self.negative(j)
    }

    pub fn hash(&self, j: J) -> u64 {
        self.hash[j as usize]
    }

    /// Rows counted.
    pub fn row_count(&self) -> u64 {
        self.positive_row_count + self.negative_row_count
    }

    pub fn positive_row_count(&self) -> u64 {
        self.positive_row_count
    }

    pub fn negative_row_count(&self) -> u64 {
        self.negative_row_count
    }
}

impl Renumber for Stats {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        renumbering.renumber_indices(&mut self.positive);
        renumbering.renumber_indices(&mut self.negative);
        renumbering.renumber_indices(&mut self.hash);
    }
}
