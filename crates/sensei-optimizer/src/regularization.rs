//! Regularization strengths.

use serde::{Deserialize, Serialize};

/// One set of regularization strengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Regularization {
    pub l1: f64,
    pub l2: f64,
    /// Extra l1 applied only while a weight is exactly zero, making it
    /// harder for new features to enter the model.
    pub l1_at_weight_zero: f64,
}

impl Regularization {
    pub const ZERO: Self = Self {
        l1: 0.0,
        l2: 0.0,
        l1_at_weight_zero: 0.0,
    };

    pub fn l1_l2(l1: f64, l2: f64) -> Self {
        Self {
            l1,
            l2,
            l1_at_weight_zero: 0.0,
        }
    }

    fn is_zero(&self) -> bool {
        self.l1 == 0.0 && self.l2 == 0.0 && self.l1_at_weight_zero == 0.0
    }
}

/// All regularization terms, read-only during a pass.
///
/// Besides the plain terms, strengths can scale with the number of rows a
/// feature is active in (`div_sqrt_n`, `mul_sqrt_n`) or with the curvature of
/// its majorizer (`confidence`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Regularizations {
    pub base: Regularization,
    pub div_sqrt_n: Regularization,
    pub mul_sqrt_n: Regularization,
    pub confidence: Regularization,
}

impl Regularizations {
    /// Only base l1 and l2.
    pub fn standard(l1: f64, l2: f64) -> Self {
        Self {
            base: Regularization::l1_l2(l1, l2),
            ..Self::default()
        }
    }

    /// Effective l1 strength of a feature active in `rows_with_j` rows.
    pub fn l1(&self, rows_with_j: u64, weight: f64, majorizer_a: f64) -> f64 {
        let sqrt_n = ((rows_with_j + 1) as f64).sqrt();
        let sqrt_a = majorizer_a.sqrt() + f64::EPSILON;
        let mut l1 = self.base.l1
            + self.div_sqrt_n.l1 / sqrt_n
            + self.mul_sqrt_n.l1 * sqrt_n
            + self.confidence.l1 / sqrt_a;
        if weight == 0.0 {
            l1 += self.base.l1_at_weight_zero
                + self.div_sqrt_n.l1_at_weight_zero / sqrt_n
                + self.mul_sqrt_n.l1_at_weight_zero * sqrt_n
                + self.confidence.l1_at_weight_zero / sqrt_a;
        }
        l1
    }

    /// Effective l2 strength of a feature active in `rows_with_j` rows.
    pub fn l2(&self, rows_with_j: u64, majorizer_a: f64) -> f64 {
        let sqrt_n = ((rows_with_j + 1) as f64).sqrt();
        self.base.l2
            + self.div_sqrt_n.l2 / sqrt_n
            + self.mul_sqrt_n.l2 * sqrt_n
            + self.confidence.l2 / (majorizer_a.sqrt() + f64::EPSILON)
    }

    /// True if anything beyond base l1 and l2 is set.
    pub fn is_non_standard(&self) -> bool {
        self.base.l1_at_weight_zero != 0.0
            || !self.div_sqrt_n.is_zero()
            || !self.mul_sqrt_n.is_zero()
            || !self.confidence.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_constant() {
        let r = Regularizations::standard(0.5, 2.0);
        assert_eq!(r.l1(0, 1.0, 0.0), 0.5);
        assert_eq!(r.l1(1000, 0.0, 7.0), 0.5);
        assert_eq!(r.l2(99, 3.0), 2.0);
        assert!(!r.is_non_standard());
    }

    #[test]
    fn test_row_count_scaling() {
        let r = Regularizations {
            div_sqrt_n: Regularization::l1_l2(6.0, 0.0),
            mul_sqrt_n: Regularization::l1_l2(0.0, 1.0),
            ..Regularizations::default()
        };
        // sqrt(8 + 1) = 3
        assert!((r.l1(8, 1.0, 0.0) - 2.0).abs() < 1e-12);
        assert!((r.l2(8, 0.0) - 3.0).abs() < 1e-12);
        assert!(r.is_non_standard());
    }

    #[test]
    fn test_at_weight_zero_only_applies_at_zero() {
        let r = Regularizations {
            base: Regularization {
                l1: 1.0,
                l2: 0.0,
                l1_at_weight_zero: 4.0,
            },
            ..Regularizations::default()
        };
        assert_eq!(r.l1(0, 0.0, 0.0), 5.0);
        assert_eq!(r.l1(0, -0.1, 0.0), 1.0);
        assert!(r.is_non_standard());
    }

    #[test]
    fn test_confidence_stays_finite_at_zero_curvature() {
        let r = Regularizations {
            confidence: Regularization::l1_l2(1.0, 1.0),
            ..Regularizations::default()
        };
        assert!(r.l1(0, 1.0, 0.0).is_finite());
        assert!(r.l2(0, 0.0).is_finite());
        assert!((r.l2(0, 4.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_partial() {
        let r: Regularizations = serde_json::from_str(r#"{"base": {"l2": 0.1}}"#).unwrap();
        assert_eq!(r, Regularizations::standard(0.0, 0.1));
    }
}
