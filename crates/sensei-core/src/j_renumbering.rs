//! Stable compaction of dense feature ids.
//!
//! Every structure indexed by feature id (weights, stats, majorizer
//! coefficients, the feature index, sparse matrix columns, dependee edges)
//! implements [`Renumber`]. A single [`JRenumbering`] has to be applied to all
//! of them before any of them is used again, otherwise ids stop agreeing.

use std::ops::Range;

use crate::error::{CoreError, Result};

/// Dense id of a feature (base or product).
pub type J = u32;

/// Reserved id marking a removed or unknown feature.
pub const INVALID_J: J = u32::MAX;

/// Mapping from old feature ids to new ones.
///
/// Survivors keep their relative order and are packed into `0..next_j`.
/// Removed ids map to [`INVALID_J`]. An empty mapping means "no renumbering"
/// and every operation on it is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JRenumbering {
    j_to_new_j: Vec<J>,
    next_j: J,
}

impl JRenumbering {
    /// Builds the renumbering that removes every `j` with `js_to_remove[j]`.
    ///
    /// # Example
    ///
    /// ```
    /// use sensei_core::{JRenumbering, INVALID_J};
    ///
    /// let r = JRenumbering::remove_js(&[false, true, false]);
    /// assert_eq!(r.j_to_new_j(), &[0, INVALID_J, 1]);
    /// assert_eq!(r.next_j(), 2);
    /// ```
    pub fn remove_js(js_to_remove: &[bool]) -> Self {
        let j_to_new_j = js_to_remove
            .iter()
            .map(|&removed| if removed { INVALID_J } else { 0 })
            .collect();
        let mut renumbering = Self {
            j_to_new_j,
            next_j: 0,
        };
        renumbering.fill_j_to_new_j();
        renumbering
    }

    /// Renumbering that keeps all `size` ids in place.
    pub fn identity(size: usize) -> Self {
        Self::remove_js(&vec![false; size])
    }

    /// Validates a mapping built elsewhere.
    ///
    /// Surviving entries must be exactly `0, 1, 2, ...` in increasing old-id
    /// order; anything else would reorder features.
    pub fn from_mapping(j_to_new_j: Vec<J>) -> Result<Self> {
        let mut next_j: J = 0;
        for (old_j, &new_j) in j_to_new_j.iter().enumerate() {
            if new_j == INVALID_J {
                continue;
            }
            if new_j != next_j {
                return Err(CoreError::InvalidRenumbering {
                    j: old_j as J,
                    reason: format!("expected new id {next_j}, found {new_j}"),
                });
            }
            next_j += 1;
        }
        Ok(Self { j_to_new_j, next_j })
    }

    /// Old id to new id table.
    pub fn j_to_new_j(&self) -> &[J] {
        &self.j_to_new_j
    }

    /// Number of surviving ids.
    pub fn next_j(&self) -> J {
        self.next_j
    }

    /// True for the empty mapping, which renumbers nothing.
    pub fn is_empty(&self) -> bool {
        self.j_to_new_j.is_empty()
    }

    /// New id of `j`, or `None` if it was removed.
    pub fn new_j(&self, j: J) -> Option<J> {
        match self.j_to_new_j[j as usize] {
            INVALID_J => None,
            new_j => Some(new_j),
        }
    }

    /// True if applying this renumbering changes nothing.
    pub fn is_no_op(&self) -> bool {
        self.j_to_new_j
            .iter()
            .enumerate()
            .all(|(j, &new_j)| new_j == j as J)
    }

    /// Marks `j` as removed and repacks the survivors.
    pub fn set_invalid(&mut self, j: J) {
        assert!(
            (j as usize) < self.j_to_new_j.len(),
            "j {j} out of range for renumbering of size {}",
            self.j_to_new_j.len()
        );
        self.j_to_new_j[j as usize] = INVALID_J;
        self.fill_j_to_new_j();
    }

    fn fill_j_to_new_j(&mut self) {
        self.next_j = 0;
        for new_j in self.j_to_new_j.iter_mut() {
            if *new_j != INVALID_J {
                *new_j = self.next_j;
                self.next_j += 1;
            }
        }
        assert_ne!(self.next_j, INVALID_J, "too many features");
    }

    /// Inverse table: for each new id, the old id it came from.
    pub fn new_j_to_old_j(&self) -> Vec<J> {
        let mut ret = vec![INVALID_J; self.next_j as usize];
        for (old_j, &new_j) in self.j_to_new_j.iter().enumerate() {
            if new_j != INVALID_J {
                ret[new_j as usize] = old_j as J;
            }
        }
        ret
    }

    /// Drops removed ids from `js` and renames the rest.
    pub fn remove_and_renumber_js(&self, js: &mut Vec<J>) {
        if self.is_empty() {
            return;
        }
        let len = js.len();
        let new_len = self.remove_and_renumber_js_to(js, 0..len, 0);
        js.truncate(new_len);
        js.shrink_to_fit();
    }

    /// Rewrites the ids in `buf[input]` to `buf[out_start..]`, dropping
    /// removed ones. Returns the number of ids written.
    ///
    /// # Panics
    ///
    /// Panics if the mapping is empty or if `out_start` lies after
    /// `input.start` (the write cursor would overtake the read cursor).
    pub fn remove_and_renumber_js_to(
        &self,
        buf: &mut [J],
        input: Range<usize>,
        out_start: usize,
    ) -> usize {
        assert!(!self.is_empty(), "renumbering a row with an empty mapping");
        assert!(
            out_start <= input.start,
            "output offset {out_start} is past input offset {}",
            input.start
        );
        let mut written = 0;
        for k in input {
            let j = buf[k] as usize;
            debug_assert!(j < self.j_to_new_j.len());
            let new_j = self.j_to_new_j[j];
            if new_j != INVALID_J {
                buf[out_start + written] = new_j;
                written += 1;
            }
        }
        written
    }

    /// Moves every surviving element of a J-indexed vector to its new slot.
    ///
    /// The vector may be shorter than the mapping (stats that were never
    /// grown to the full size); the result always has `next_j` elements.
    pub fn renumber_indices<T: Default>(&self, v: &mut Vec<T>) {
        if self.is_empty() {
            return;
        }
        debug_assert!(v.len() <= self.j_to_new_j.len());
        let mut new_v: Vec<T> = std::iter::repeat_with(T::default)
            .take(self.next_j as usize)
            .collect();
        for (j, value) in std::mem::take(v).into_iter().enumerate() {
            let new_j = self.j_to_new_j[j];
            if new_j != INVALID_J {
                new_v[new_j as usize] = value;
            }
        }
        *v = new_v;
    }
}

/// Implemented by every structure indexed by feature id.
pub trait Renumber {
    /// Removes ids mapped to [`INVALID_J`] and moves the rest to their new ids.
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering);
}
