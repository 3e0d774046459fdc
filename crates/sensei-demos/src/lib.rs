//! Demo applications for Sensei.
//!
//! - `synthetic_train` - fits a model on generated rows with a planted
//!   two-feature interaction, then explores products and prunes.
//!
//! ```bash
//! cargo run -p sensei-demos --bin synthetic_train -- --rows 20000 --explore-rounds 2
//! ```
//!
//! The generator lives here so it can be tested.

use rand::Rng;
use sensei_training::{FeatureSpec, LabeledRow};

/// Rows over `groups` categorical groups named `g0:`, `g1:`, ... with
/// `values` values each. Rows are positive when `g0:0` and `g1:0` are both
/// present; `noise` is the probability of flipping a label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticTask {
    pub groups: usize,
    pub values: usize,
    pub noise: f64,
}

impl SyntheticTask {
    /// # Panics
    ///
    /// Panics with fewer than 2 groups or values, or a noise outside [0, 0.5).
    pub fn new(groups: usize, values: usize, noise: f64) -> Self {
        assert!(groups >= 2, "groups must be at least 2");
        assert!(values >= 2, "values must be at least 2");
        assert!((0.0..0.5).contains(&noise), "noise must be in [0, 0.5)");
        Self {
            groups,
            values,
            noise,
        }
    }

    pub fn feature_name(group: usize, value: usize) -> String {
        format!("g{group}:{value}")
    }

    /// Bias plus one single-factor spec per group.
    pub fn specs(&self) -> Vec<FeatureSpec> {
        std::iter::once(FeatureSpec::bias())
            .chain((0..self.groups).map(|g| FeatureSpec::new([format!("g{g}:")])))
            .collect()
    }

    /// The two feature names whose conjunction decides the label.
    pub fn planted_pair(&self) -> [String; 2] {
        [Self::feature_name(0, 0), Self::feature_name(1, 0)]
    }

    pub fn generate(&self, rng: &mut impl Rng, count: usize) -> Vec<LabeledRow> {
        (0..count)
            .map(|_| {
                let values: Vec<usize> = (0..self.groups)
                    .map(|_| rng.gen_range(0..self.values))
                    .collect();
                let planted = values[0] == 0 && values[1] == 0;
                let flipped = rng.gen_bool(self.noise);
                let y = if planted != flipped { 1.0 } else { -1.0 };
                let features = values
                    .iter()
                    .enumerate()
                    .map(|(group, &value)| Self::feature_name(group, value));
                LabeledRow::new(features, y)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rows_have_one_value_per_group() {
        let task = SyntheticTask::new(3, 4, 0.0);
        let rows = task.generate(&mut StdRng::seed_from_u64(1), 200);
        assert_eq!(rows.len(), 200);
        for row in &rows {
            assert_eq!(row.features.len(), 3);
            let planted = row.features[0] == "g0:0" && row.features[1] == "g1:0";
            assert_eq!(row.y == 1.0, planted);
        }
        assert!(rows.iter().any(|row| row.y == 1.0));
    }

    #[test]
    fn test_specs_cover_every_group() {
        let specs = SyntheticTask::new(2, 2, 0.1).specs();
        assert_eq!(specs.len(), 3);
        assert!(specs[0].prefixes.is_empty());
        assert_eq!(specs[2].prefixes, vec!["g1:".to_string()]);
    }

    #[test]
    #[should_panic(expected = "noise must be in [0, 0.5)")]
    fn test_rejects_noise_that_hides_the_signal() {
        SyntheticTask::new(2, 2, 0.5);
    }
}
