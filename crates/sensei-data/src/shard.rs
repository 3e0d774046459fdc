//! Row partitions.

use sensei_core::{JRenumbering, Renumber, INVALID_ROW_ID, J};

use crate::csr_matrix::CsrMatrix;
use crate::row_extender::RowExtender;

/// One independently processable partition of rows.
///
/// Rows, labels and ids are parallel arrays of equal length. User ids are
/// optional; when present there is exactly one per row.
#[derive(Debug, Default)]
pub struct Shard {
    rows: CsrMatrix,
    ys: Vec<f64>,
    ids: Vec<u32>,
    user_ids: Vec<u64>,
}

impl Shard {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `id` is the reserved invalid row id.
    pub fn add_row(&mut self, js: &[J], y: f64, id: u32) {
        assert_ne!(id, INVALID_ROW_ID, "at most 2^32-1 data rows are supported");
        self.rows.add_row(js);
        self.ys.push(y);
        self.ids.push(id);
    }

    /// Attaches a user id to the row added last.
    ///
    /// # Panics
    ///
    /// Panics unless called right after the matching [`Shard::add_row`].
    pub fn add_user_id(&mut self, user_id: u64) {
        assert_eq!(
            self.user_ids.len() + 1,
            self.row_count(),
            "user id must be added right after its row"
        );
        self.user_ids.push(user_id);
    }

    pub fn row_count(&self) -> usize {
        assert_eq!(self.ys.len(), self.rows.row_count());
        self.ys.len()
    }

    pub fn row(&self, i: usize) -> &[J] {
        self.rows.row(i)
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// # Panics
    ///
    /// Panics if the shard has no user ids.
    pub fn user_ids(&self) -> &[u64] {
        assert_eq!(self.user_ids.len(), self.row_count(), "shard has no user ids");
        &self.user_ids
    }

    pub fn has_user_ids(&self) -> bool {
        !self.user_ids.is_empty()
    }

    /// Stored (not materialized) non-zeros.
    pub fn xj_bool_count(&self) -> u64 {
        self.rows.non_zeros_count()
    }

    pub fn size_bytes(&self) -> u64 {
        self.rows.size_bytes()
            + (self.ys.capacity() * std::mem::size_of::<f64>()
                + self.ids.capacity() * std::mem::size_of::<u32>()
                + self.user_ids.capacity() * std::mem::size_of::<u64>()
                + std::mem::size_of::<Self>()) as u64
    }

    /// Loads row `i` into `row_extender`.
    #[inline]
    pub fn reset_extender<'a>(&'a self, i: usize, row_extender: &mut RowExtender<'a>) {
        row_extender.reset_row(self.rows.row(i), self.ys[i], u64::from(self.ids[i]));
    }
}

impl Renumber for Shard {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        self.rows.remove_and_renumber_js(renumbering);
    }
}

/// Splits a stream of rows into shards of bounded size.
///
/// A new shard is started when the current one is non-empty and the next
/// row would push it over `max_size` stored non-zeros. A single oversized
/// row still gets a shard of its own.
#[derive(Debug)]
pub struct ShardBuilder {
    max_size: u64,
    shards: Vec<Shard>,
}

impl ShardBuilder {
    pub fn new(max_size: u64) -> Self {
        Self {
            max_size,
            shards: Vec::new(),
        }
    }

    pub fn add_row(&mut self, js: &[J], y: f64, id: u32) {
        let start_new = match self.shards.last() {
            None => true,
            Some(last) => {
                last.xj_bool_count() > 0 && last.xj_bool_count() + js.len() as u64 > self.max_size
            }
        };
        if start_new {
            self.shards.push(Shard::new());
        }
        if let Some(shard) = self.shards.last_mut() {
            shard.add_row(js, y, id);
        }
    }

    /// # Panics
    ///
    /// Panics if no row was added yet.
    pub fn add_user_id(&mut self, user_id: u64) {
        self.shards
            .last_mut()
            .unwrap_or_else(|| panic!("user id added before any row"))
            .add_user_id(user_id);
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn into_shards(self) -> Vec<Shard> {
        self.shards
    }
}
