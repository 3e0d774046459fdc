//! Feature dependency DAG.

use sensei_core::{JRenumbering, Renumber, J};

use crate::csr_matrix::{CooMatrix, CsrMatrix};

/// Maps each feature id to the product features that have it as a factor.
///
/// Row `j` lists the dependees of `j`. Every edge points from a smaller id to
/// a strictly larger one; [`crate::RowExtender`] relies on that to expand a
/// row in a single forward pass, so it is checked whenever edges are added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    matrix: CsrMatrix,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from sorted `(factor, product)` coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `coo` is unsorted or has an edge with `product <= factor`.
    pub fn from_coo(coo: &CooMatrix) -> Self {
        for &(parent, child) in coo.all_coords() {
            check_edge(parent, child);
        }
        Self {
            matrix: CsrMatrix::from_coo(coo),
        }
    }

    /// Adds `(factor, product)` edges, keeping the row count at least as
    /// large as before.
    pub fn extend(&mut self, edges: &[(J, J)]) {
        if edges.is_empty() {
            return;
        }
        let mut coo = self.matrix.to_coo();
        coo.reserve(edges.len());
        for &(parent, child) in edges {
            check_edge(parent, child);
            coo.set_true(parent, child);
        }
        coo.sort();
        let row_count = self.matrix.row_count();
        self.matrix = CsrMatrix::from_coo(&coo);
        if self.matrix.row_count() < row_count {
            self.matrix.set_row_count(row_count);
        }
    }

    /// Dependees of `j`; empty for ids past the last row.
    #[inline]
    pub fn children(&self, j: J) -> &[J] {
        let j = j as usize;
        if j < self.matrix.row_count() {
            self.matrix.row(j)
        } else {
            &[]
        }
    }

    pub fn row_count(&self) -> usize {
        self.matrix.row_count()
    }

    pub fn set_row_count(&mut self, row_count: usize) {
        self.matrix.set_row_count(row_count);
    }

    /// Number of edges.
    pub fn non_zeros_count(&self) -> u64 {
        self.matrix.non_zeros_count()
    }

    pub fn has_edges(&self) -> bool {
        self.non_zeros_count() > 0
    }

    /// All `(factor, product)` edges in sorted order.
    pub fn edges(&self) -> Vec<(J, J)> {
        self.matrix.to_coo().all_coords().to_vec()
    }

    pub fn to_coo(&self) -> CooMatrix {
        self.matrix.to_coo()
    }

    pub fn size_bytes(&self) -> u64 {
        self.matrix.size_bytes()
    }

    /// For each `j` (highest first), the number of edges a full expansion
    /// walks below it: `1 + total(child)` summed over its children.
    pub fn transitive_edge_counts(&self, size: usize) -> Vec<u64> {
        let mut transitive = vec![0u64; size];
        for j in (0..size).rev() {
            let mut total = 0;
            for &child in self.children(j as J) {
                check_edge(j as J, child);
                total += 1 + transitive[child as usize];
            }
            transitive[j] = total;
        }
        transitive
    }
}

#[inline]
fn check_edge(parent: J, child: J) {
    assert!(
        child > parent,
        "dependee {child} of feature {parent} must have a larger id"
    );
}

impl Renumber for DependencyGraph {
    /// Renames both ends of every edge; edges touching a removed feature
    /// disappear with it.
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_empty() {
            return;
        }
        self.matrix.remove_and_renumber_js(renumbering);
        self.matrix.remove_and_renumber_rows(renumbering);
    }
}
