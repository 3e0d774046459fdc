//! Keys stored in a feature index.

use std::fmt::{self, Debug};
use std::hash::Hash;

use sensei_core::J;
use serde::{Deserialize, Serialize};

/// Anything a [`crate::FeatureIndex`] can map to a dense id.
pub trait FeatureKey: Hash + Eq + Clone + Debug + Send + Sync {
    /// Bytes the key owns on the heap.
    fn heap_size_bytes(&self) -> usize;
}

/// An atomic named feature, as it appears in the input data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureName(String);

impl FeatureName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FeatureName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FeatureKey for FeatureName {
    fn heap_size_bytes(&self) -> usize {
        self.0.capacity()
    }
}

/// A product feature: the conjunction of a set of base feature ids.
///
/// Factors are kept sorted and deduplicated, so equality and hashing are
/// structural over the set. The empty product is the always-on bias feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct JProduct(Vec<J>);

impl JProduct {
    /// Builds a product from factor ids in any order, with duplicates allowed.
    ///
    /// # Example
    ///
    /// ```
    /// use sensei_feature_index::JProduct;
    ///
    /// let p = JProduct::new(vec![3, 1, 3]);
    /// assert_eq!(p.js(), &[1, 3]);
    /// assert_eq!(p, JProduct::new(vec![1, 3]));
    /// ```
    pub fn new(mut js: Vec<J>) -> Self {
        js.sort_unstable();
        js.dedup();
        js.shrink_to_fit();
        Self(js)
    }

    /// The empty product, active in every row.
    pub fn bias() -> Self {
        Self(Vec::new())
    }

    /// A product with a single factor.
    pub fn single(j: J) -> Self {
        Self(vec![j])
    }

    /// Conjunction of two products.
    pub fn and(f1: &JProduct, f2: &JProduct) -> Self {
        let mut merged = Vec::with_capacity(f1.0.len() + f2.0.len());
        let (a, b) = (&f1.0, &f2.0);
        let (mut i, mut k) = (0, 0);
        while i < a.len() || k < b.len() {
            let next = if k >= b.len() || (i < a.len() && a[i] <= b[k]) {
                i += 1;
                a[i - 1]
            } else {
                k += 1;
                b[k - 1]
            };
            if merged.last() != Some(&next) {
                merged.push(next);
            }
        }
        Self(merged)
    }

    /// Sorted factor ids.
    pub fn js(&self) -> &[J] {
        &self.0
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_bias(&self) -> bool {
        self.0.is_empty()
    }
}

impl FeatureKey for JProduct {
    fn heap_size_bytes(&self) -> usize {
        self.0.capacity() * std::mem::size_of::<J>()
    }
}
