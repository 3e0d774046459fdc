//! Compressed sparse row storage of boolean matrices.
//!
//! Only the positions of `true` entries are stored. Row `i` is
//! `contents[boundaries[i]..boundaries[i + 1]]`, so a row is a zero-copy
//! slice of column ids.

use sensei_core::{JRenumbering, Renumber, INVALID_J, J};

/// Boolean matrix as a list of `(row, column)` coordinates.
///
/// <https://en.wikipedia.org/wiki/Sparse_matrix#Coordinate_list_(COO)>
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooMatrix {
    contents: Vec<(u32, u32)>,
    row_count: u32,
}

impl CooMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, additional: usize) {
        self.contents.reserve(additional);
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn set_row_count(&mut self, row_count: u32) {
        self.row_count = row_count;
    }

    pub fn set_true(&mut self, row: u32, column: u32) {
        self.contents.push((row, column));
    }

    pub fn sort(&mut self) {
        self.contents.sort_unstable();
    }

    pub fn is_sorted(&self) -> bool {
        self.contents.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn all_coords(&self) -> &[(u32, u32)] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// Append-only boolean matrix in compressed sparse row form.
///
/// # Example
///
/// ```
/// use sensei_data::CsrMatrix;
///
/// let mut m = CsrMatrix::new();
/// m.add_row(&[1, 4]);
/// m.add_row(&[]);
/// m.add_row(&[2]);
/// assert_eq!(m.row_count(), 3);
/// assert_eq!(m.row(0), &[1, 4]);
/// assert_eq!(CsrMatrix::from_coo(&m.to_coo()), m);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrMatrix {
    boundaries: Vec<usize>,
    contents: Vec<J>,
}

impl Default for CsrMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrMatrix {
    pub fn new() -> Self {
        Self {
            boundaries: vec![0],
            contents: Vec::new(),
        }
    }

    pub fn add_row(&mut self, js: &[J]) {
        self.contents.extend_from_slice(js);
        self.boundaries.push(self.contents.len());
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[J] {
        &self.contents[self.boundaries[i]..self.boundaries[i + 1]]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[J]> + '_ {
        (0..self.row_count()).map(move |i| self.row(i))
    }

    pub fn row_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Appends empty rows up to `row_count`.
    ///
    /// # Panics
    ///
    /// Panics if that would shrink the matrix.
    pub fn set_row_count(&mut self, row_count: usize) {
        assert!(
            row_count >= self.row_count(),
            "cannot shrink matrix from {} to {row_count} rows",
            self.row_count()
        );
        self.boundaries.resize(row_count + 1, self.contents.len());
    }

    pub fn non_zeros_count(&self) -> u64 {
        self.contents.len() as u64
    }

    pub fn size_bytes(&self) -> u64 {
        (self.contents.capacity() * std::mem::size_of::<J>()
            + self.boundaries.capacity() * std::mem::size_of::<usize>()
            + std::mem::size_of::<Self>()) as u64
    }

    /// Builds a matrix from coordinates sorted by `(row, column)`.
    ///
    /// The result has `coo.row_count()` rows, or more if a coordinate lies
    /// past that.
    ///
    /// # Panics
    ///
    /// Panics if `coo` is not sorted.
    pub fn from_coo(coo: &CooMatrix) -> Self {
        assert!(coo.is_sorted(), "coordinate matrix must be sorted");
        let mut boundaries = Vec::with_capacity(coo.row_count() as usize + 1);
        let mut contents = Vec::with_capacity(coo.len());
        for &(i, j) in coo.all_coords() {
            while i as usize >= boundaries.len() {
                boundaries.push(contents.len());
            }
            contents.push(j);
        }
        let row_count = (coo.row_count() as usize).max(boundaries.len());
        boundaries.resize(row_count + 1, contents.len());
        Self {
            boundaries,
            contents,
        }
    }

    pub fn to_coo(&self) -> CooMatrix {
        let mut coo = CooMatrix::new();
        coo.reserve(self.contents.len());
        coo.set_row_count(self.row_count() as u32);
        for (i, row) in self.rows().enumerate() {
            for &j in row {
                coo.set_true(i as u32, j);
            }
        }
        coo
    }

    /// Reorders rows: new row `k` is old row `new_j_to_old_j[k]`, where the
    /// rows themselves are indexed by feature id. Old rows past the end of
    /// the matrix count as empty.
    pub fn remove_and_renumber_rows(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_empty() {
            return;
        }
        let mut renumbered = CsrMatrix::new();
        for old_j in renumbering.new_j_to_old_j() {
            assert_ne!(old_j, INVALID_J);
            if (old_j as usize) < self.row_count() {
                renumbered.add_row(self.row(old_j as usize));
            } else {
                renumbered.add_row(&[]);
            }
        }
        *self = renumbered;
    }
}

impl Renumber for CsrMatrix {
    /// Drops removed column ids and renames the rest, compacting row by row
    /// in place.
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_empty() {
            return;
        }
        let mut input_offset = 0;
        for i in 0..self.row_count() {
            let input_end = self.boundaries[i + 1];
            let new_length = renumbering.remove_and_renumber_js_to(
                &mut self.contents,
                input_offset..input_end,
                self.boundaries[i],
            );
            input_offset = input_end;
            self.boundaries[i + 1] = self.boundaries[i] + new_length;
        }
        self.contents.truncate(self.boundaries[self.row_count()]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[&[J]]) -> CsrMatrix {
        let mut m = CsrMatrix::new();
        for row in rows {
            m.add_row(row);
        }
        m
    }

    #[test]
    fn test_empty_matrix() {
        let m = CsrMatrix::new();
        assert_eq!(m.row_count(), 0);
        assert_eq!(m.non_zeros_count(), 0);
        assert_eq!(m.to_coo(), CooMatrix::new());
    }

    #[test]
    fn test_coo_round_trip_keeps_trailing_empty_rows() {
        let mut coo = CooMatrix::new();
        coo.set_true(0, 3);
        coo.set_true(2, 1);
        coo.set_true(2, 5);
        coo.set_row_count(5);
        let m = CsrMatrix::from_coo(&coo);
        assert_eq!(m.row_count(), 5);
        assert_eq!(m.row(1), &[] as &[J]);
        assert_eq!(m.row(2), &[1, 5]);
        assert_eq!(m.to_coo(), coo);
    }

    #[test]
    #[should_panic(expected = "must be sorted")]
    fn test_unsorted_coo_is_rejected() {
        let mut coo = CooMatrix::new();
        coo.set_true(1, 0);
        coo.set_true(0, 0);
        CsrMatrix::from_coo(&coo);
    }

    #[test]
    fn test_remove_and_renumber_columns() {
        let mut m = matrix(&[&[0, 1, 2], &[1], &[2, 3], &[]]);
        m.remove_and_renumber_js(&JRenumbering::remove_js(&[false, true, false, false]));
        assert_eq!(m, matrix(&[&[0, 1], &[], &[1, 2], &[]]));
        assert_eq!(m.non_zeros_count(), 3);
    }

    #[test]
    fn test_empty_renumbering_is_a_no_op() {
        let mut m = matrix(&[&[0, 1]]);
        m.remove_and_renumber_js(&JRenumbering::default());
        m.remove_and_renumber_rows(&JRenumbering::default());
        assert_eq!(m, matrix(&[&[0, 1]]));
    }

    #[test]
    fn test_remove_and_renumber_rows() {
        let mut m = matrix(&[&[7], &[8], &[9]]);
        m.remove_and_renumber_rows(&JRenumbering::remove_js(&[false, true, false, false]));
        assert_eq!(m, matrix(&[&[7], &[9], &[]]));
    }

    #[test]
    fn test_set_row_count_pads() {
        let mut m = matrix(&[&[1]]);
        m.set_row_count(3);
        assert_eq!(m.row_count(), 3);
        assert!(m.row(2).is_empty());
    }

    #[test]
    #[should_panic(expected = "cannot shrink")]
    fn test_set_row_count_never_shrinks() {
        let mut m = matrix(&[&[1], &[2]]);
        m.set_row_count(1);
    }
}
