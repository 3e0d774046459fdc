//! Concurrent feature index for Sensei.
//!
//! Features are identified by keys: [`FeatureName`] for atomic features read
//! from data, [`JProduct`] for conjunctions of atomic features. A
//! [`FeatureIndex`] assigns each key a dense id ([`sensei_core::J`]) on first
//! sight and maps ids back to keys after an explicit sync.
//!
//! Two regimes alternate over the lifetime of an index:
//!
//! 1. **Growing**: any number of threads call [`FeatureIndex::feature_to_j`]
//!    through a shared reference. Ids come out dense and in creation order.
//! 2. **Reading back**: after [`FeatureIndex::sync_j_to_feature_map`] (which
//!    takes `&mut self`), [`FeatureIndex::j_to_feature`] and
//!    [`FeatureIndex::all`] are valid until the next insert.
//!
//! Removing features goes through [`sensei_core::Renumber`], which also needs
//! exclusive access.
//!
//! # Example
//!
//! ```
//! use sensei_feature_index::{FeatureMap, FeatureName, FeatureSet, JProduct, ProductMap};
//!
//! let mut features = FeatureMap::new();
//! let pl = features.feature_to_j(&FeatureName::new("country=pl"));
//! let linux = features.feature_to_j(&FeatureName::new("os=linux"));
//! features.sync_j_to_feature_map();
//!
//! let mut products = ProductMap::new();
//! products.feature_to_j(&JProduct::bias());
//! let both = products.feature_to_j(&JProduct::new(vec![pl, linux]));
//! products.sync_j_to_feature_map();
//!
//! let countries = features.feature_set_to_js(&FeatureSet::with_prefixes(["country="]));
//! let touched = products.have_at_least_one_feature_j(&countries);
//! assert!(touched[both as usize]);
//! ```

pub mod feature_set;
pub mod index;
pub mod key;

pub use feature_set::{FeatureMap, FeatureSet, ProductMap};
pub use index::FeatureIndex;
pub use key::{FeatureKey, FeatureName, JProduct};
