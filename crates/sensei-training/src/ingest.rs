//! Mapping raw labeled rows to stored feature ids.

use sensei_core::{Sequence, INVALID_ROW_ID, J};
use sensei_data::ShardBuilder;
use sensei_feature_index::{FeatureMap, FeatureName, JProduct, ProductMap};
use serde::{Deserialize, Serialize};

/// One input row: named boolean features and a label of 1 or -1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRow {
    pub features: Vec<String>,
    pub y: f64,
    #[serde(default)]
    pub user_id: Option<u64>,
}

impl LabeledRow {
    pub fn new<I, S>(features: I, y: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
            y,
            user_id: None,
        }
    }
}

/// Which products of a row's features are stored.
///
/// For prefixes `p1..pk`, every combination of one row feature starting
/// with each `pi` becomes a product feature. No prefixes stores the bias
/// product, present in every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub prefixes: Vec<String>,
}

impl FeatureSpec {
    pub fn bias() -> Self {
        Self::default()
    }

    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Turns [`LabeledRow`]s into stored rows.
///
/// Shared by every ingesting thread: new names and products get ids from
/// the thread-safe maps, row ids come from one [`Sequence`].
#[derive(Debug, Clone, Copy)]
pub struct RowIngestor<'a> {
    feature_map: &'a FeatureMap,
    product_map: &'a ProductMap,
    specs: &'a [FeatureSpec],
    row_ids: &'a Sequence,
}

impl<'a> RowIngestor<'a> {
    pub fn new(
        feature_map: &'a FeatureMap,
        product_map: &'a ProductMap,
        specs: &'a [FeatureSpec],
        row_ids: &'a Sequence,
    ) -> Self {
        Self {
            feature_map,
            product_map,
            specs,
            row_ids,
        }
    }

    /// Sorted product ids of one row.
    pub fn row_to_js(&self, features: &[String]) -> Vec<J> {
        let mut js = Vec::new();
        for spec in self.specs {
            let mut combinations: Vec<Vec<J>> = vec![Vec::new()];
            for prefix in &spec.prefixes {
                let matching: Vec<J> = features
                    .iter()
                    .filter(|name| name.starts_with(prefix.as_str()))
                    .map(|name| self.feature_map.feature_to_j(&FeatureName::new(name.as_str())))
                    .collect();
                combinations = combinations
                    .iter()
                    .flat_map(|prefix_js| {
                        matching.iter().map(move |&j| {
                            let mut extended = prefix_js.clone();
                            extended.push(j);
                            extended
                        })
                    })
                    .collect();
            }
            js.extend(
                combinations
                    .into_iter()
                    .map(|factors| self.product_map.feature_to_j(&JProduct::new(factors))),
            );
        }
        js.sort_unstable();
        js.dedup();
        js
    }

    /// Appends `rows` to `builder`. Returns the number of raw features read.
    ///
    /// # Panics
    ///
    /// Panics on a label other than 1 or -1, or when row ids run out.
    pub fn ingest(&self, rows: &[LabeledRow], builder: &mut ShardBuilder) -> u64 {
        let mut feature_count = 0;
        for row in rows {
            assert!(
                row.y == 1.0 || row.y == -1.0,
                "label must be 1 or -1, got {}",
                row.y
            );
            let js = self.row_to_js(&row.features);
            let id = self.row_ids.next_value();
            assert!(
                id < u64::from(INVALID_ROW_ID),
                "at most 2^32-1 data rows are supported"
            );
            builder.add_row(&js, row.y, id as u32);
            if let Some(user_id) = row.user_id {
                builder.add_user_id(user_id);
            }
            feature_count += row.features.len() as u64;
        }
        feature_count
    }
}
