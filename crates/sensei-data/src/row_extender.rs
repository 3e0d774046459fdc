//! Materialization of a stored row through the dependency DAG.

use hashbrown::HashMap;
use sensei_core::util::sparse_dot;
use sensei_core::J;

use crate::dependees::DependencyGraph;

/// Reusable buffers of a [`RowExtender`].
///
/// Kept separately so a pool of them can be shared across passes.
#[derive(Debug, Clone, Default)]
pub struct RowScratch {
    rewritten: Vec<J>,
    counters: HashMap<J, u32>,
}

/// Expands stored rows to their full set of active features.
///
/// A product feature is active when both of its factors are. Starting from
/// the stored row, every active feature bumps a counter on each of its
/// dependees; a dependee whose counter reaches two is appended to the active
/// list, unless the stored row already has it, and expanded in turn. The
/// list is walked by index because it grows while being walked. Edges always
/// point to larger ids, so nothing is revisited.
///
/// ```
/// use sensei_data::{DependencyGraph, RowExtender};
///
/// let mut graph = DependencyGraph::new();
/// graph.set_row_count(4);
/// graph.extend(&[(0, 2), (1, 2), (2, 3), (1, 3)]);
///
/// let stored = [0, 1];
/// let mut row = RowExtender::new(&graph);
/// row.reset_row(&stored, 1.0, 7);
/// assert_eq!(row.sparse_bool(), &[0, 1, 2, 3]);
/// assert_eq!(row.operation_count(), 4);
/// ```
#[derive(Debug)]
pub struct RowExtender<'a> {
    dependees: &'a DependencyGraph,
    scratch: RowScratch,
    stored: &'a [J],
    rewritten: bool,
    y: f64,
    id: u64,
    operation_count: u64,
}

impl<'a> RowExtender<'a> {
    pub fn new(dependees: &'a DependencyGraph) -> Self {
        Self::with_scratch(dependees, RowScratch::default())
    }

    pub fn with_scratch(dependees: &'a DependencyGraph, scratch: RowScratch) -> Self {
        Self {
            dependees,
            scratch,
            stored: &[],
            rewritten: false,
            y: 0.0,
            id: 0,
            operation_count: 0,
        }
    }

    /// Gives the buffers back, e.g. to return them to a pool.
    pub fn into_scratch(self) -> RowScratch {
        self.scratch
    }

    pub fn reset_row(&mut self, sparse_bool: &'a [J], y: f64, id: u64) {
        self.operation_count = 0;
        self.y = y;
        self.id = id;
        if self.dependees.has_edges() {
            self.scratch.rewritten.clear();
            self.scratch.rewritten.extend_from_slice(sparse_bool);
            self.extend_sparse_bool();
            self.rewritten = true;
            self.stored = &[];
        } else {
            self.stored = sparse_bool;
            self.rewritten = false;
        }
    }

    fn extend_sparse_bool(&mut self) {
        let RowScratch {
            rewritten,
            counters,
        } = &mut self.scratch;
        let stored_len = rewritten.len();
        let mut i = 0;
        while i < rewritten.len() {
            let j = rewritten[i];
            for &child in self.dependees.children(j) {
                self.operation_count += 1;
                let count = counters.entry(child).or_insert(0);
                debug_assert!(*count < 2);
                *count += 1;
                // A product may also be stored in the row itself.
                if *count == 2 && !rewritten[..stored_len].contains(&child) {
                    rewritten.push(child);
                }
            }
            i += 1;
        }
        counters.clear();
    }

    /// Active feature ids of the current row.
    #[inline]
    pub fn sparse_bool(&self) -> &[J] {
        if self.rewritten {
            &self.scratch.rewritten
        } else {
            self.stored
        }
    }

    #[inline]
    pub fn dot(&self, w: &[f64]) -> f64 {
        sparse_dot(self.sparse_bool(), w)
    }

    /// Dot product with weights read through `weight`.
    #[inline]
    pub fn dot_with(&self, weight: impl Fn(J) -> f64) -> f64 {
        self.sparse_bool().iter().map(|&j| weight(j)).sum()
    }

    /// Squared L2 norm of the row; every entry is 1.
    #[inline]
    pub fn l2_squared_norm(&self) -> f64 {
        self.sparse_bool().len() as f64
    }

    /// Dependee edges walked while expanding the current row.
    pub fn operation_count(&self) -> u64 {
        self.operation_count
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_dependees_uses_stored_row() {
        let graph = DependencyGraph::new();
        let stored = [2, 5];
        let mut row = RowExtender::new(&graph);
        row.reset_row(&stored, -1.0, 3);
        assert_eq!(row.sparse_bool(), &[2, 5]);
        assert_eq!(row.operation_count(), 0);
        assert_eq!(row.y(), -1.0);
        assert_eq!(row.id(), 3);
    }

    #[test]
    fn test_product_needs_both_factors() {
        let mut graph = DependencyGraph::new();
        graph.set_row_count(3);
        graph.extend(&[(0, 2), (1, 2)]);
        let stored = [0];
        let mut row = RowExtender::new(&graph);
        row.reset_row(&stored, 1.0, 0);
        assert_eq!(row.sparse_bool(), &[0]);
        assert_eq!(row.operation_count(), 1);
    }

    #[test]
    fn test_stored_product_is_not_derived_again() {
        let mut graph = DependencyGraph::new();
        graph.set_row_count(4);
        graph.extend(&[(0, 2), (1, 2), (2, 3), (1, 3)]);
        let stored = [0, 1, 2];
        let mut row = RowExtender::new(&graph);
        row.reset_row(&stored, 1.0, 0);
        assert_eq!(row.sparse_bool(), &[0, 1, 2, 3]);
        assert_eq!(row.l2_squared_norm(), 4.0);
    }

    #[test]
    fn test_counters_reset_between_rows() {
        let mut graph = DependencyGraph::new();
        graph.set_row_count(3);
        graph.extend(&[(0, 2), (1, 2)]);
        let (a, b) = ([0], [1]);
        let mut row = RowExtender::new(&graph);
        row.reset_row(&a, 1.0, 0);
        row.reset_row(&b, 1.0, 1);
        assert_eq!(row.sparse_bool(), &[1]);
    }

    #[test]
    fn test_dot_and_norm() {
        let graph = DependencyGraph::new();
        let stored = [0, 2];
        let mut row = RowExtender::new(&graph);
        row.reset_row(&stored, 1.0, 0);
        let w = [0.5, 10.0, 1.5];
        assert_eq!(row.dot(&w), 2.0);
        assert_eq!(row.dot_with(|j| w[j as usize] * 2.0), 4.0);
        assert_eq!(row.l2_squared_norm(), 2.0);
    }

    #[test]
    fn test_scratch_round_trip() {
        let mut graph = DependencyGraph::new();
        graph.set_row_count(3);
        graph.extend(&[(0, 2), (1, 2)]);
        let stored = [0, 1];
        let scratch = {
            let mut row = RowExtender::new(&graph);
            row.reset_row(&stored, 1.0, 0);
            row.into_scratch()
        };
        let mut row = RowExtender::with_scratch(&graph, scratch);
        row.reset_row(&stored, 1.0, 0);
        assert_eq!(row.sparse_bool(), &[0, 1, 2]);
    }
}
