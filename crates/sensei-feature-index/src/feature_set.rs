//! Selecting groups of features by name.

use serde::{Deserialize, Serialize};

use crate::index::FeatureIndex;
use crate::key::{FeatureName, JProduct};

/// Index of atomic named features.
pub type FeatureMap = FeatureIndex<FeatureName>;

/// Index of product features; factors are ids from a [`FeatureMap`].
pub type ProductMap = FeatureIndex<JProduct>;

/// A set of named features: an explicit list plus every feature whose name
/// starts with one of `prefixes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    #[serde(default)]
    pub explicit: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl FeatureSet {
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            explicit: names.into_iter().map(Into::into).collect(),
            prefixes: Vec::new(),
        }
    }

    pub fn with_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            explicit: Vec::new(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn matches_prefix(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

impl FeatureMap {
    /// Membership mask over feature ids. Unknown explicit names are ignored.
    ///
    /// Prefix matching walks the reverse table and so needs a synced map.
    pub fn feature_set_to_js(&self, feature_set: &FeatureSet) -> Vec<bool> {
        let mut j_in_set = vec![false; self.len()];
        for name in &feature_set.explicit {
            if let Some(j) = self.get(&FeatureName::new(name.as_str())) {
                j_in_set[j as usize] = true;
            }
        }
        if !feature_set.prefixes.is_empty() {
            for (j, name) in self.all() {
                if feature_set.matches_prefix(name.as_str()) {
                    j_in_set[j as usize] = true;
                }
            }
        }
        j_in_set
    }
}

impl ProductMap {
    /// Marks every product with at least one factor in `feature_js`.
    pub fn have_at_least_one_feature_j(&self, feature_js: &[bool]) -> Vec<bool> {
        let mut ret = vec![false; self.len()];
        for (product_j, product) in self.all() {
            ret[product_j as usize] = product.js().iter().any(|&j| {
                debug_assert!((j as usize) < feature_js.len());
                feature_js[j as usize]
            });
        }
        ret
    }

    /// Id of the empty product, if it was ever created.
    pub fn bias_j(&self) -> Option<sensei_core::J> {
        self.get(&JProduct::bias())
    }
}
