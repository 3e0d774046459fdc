//! Ranking quality of model scores.

use sensei_data::ShardSet;
use sensei_optimizer::{LiftAt, ScoreStats};

/// AUC and lift of `wxs` (one score per row, in shard order) on `shards`.
///
/// # Panics
///
/// Panics if `wxs` does not have one entry per row.
pub fn score_stats(shards: &ShardSet, wxs: &[f64], lift_fractions: &[f64]) -> ScoreStats {
    let ys = shards.shards().iter().flat_map(|shard| shard.ys().iter());
    let mut scored: Vec<(f64, bool)> = wxs.iter().copied().zip(ys.map(|&y| y == 1.0)).collect();
    assert_eq!(scored.len(), wxs.len(), "fewer rows than scores");
    assert_eq!(
        shards.shards().iter().map(|s| s.row_count()).sum::<usize>(),
        wxs.len(),
        "one score per row expected"
    );
    auc_and_lift(&mut scored, lift_fractions)
}

/// AUC and lift of `(score, is_positive)` pairs.
///
/// Rows are ranked by decreasing score; tied scores form one step of the
/// ROC curve. Lift at fraction `f` is the positive rate among the top
/// `f * n` rows (interpolated inside a tie) over the overall positive rate.
/// Both are `None` when the data has no positives, and AUC also when it
/// has no negatives.
///
/// ```
/// use sensei_training::evaluation::auc_and_lift;
///
/// let mut scored = vec![(3.0, true), (2.0, false), (1.0, true), (0.0, false)];
/// let stats = auc_and_lift(&mut scored, &[0.25, 0.5]);
/// assert_eq!(stats.auc, Some(0.75));
/// assert_eq!(stats.lifts[0].lift, Some(2.0));
/// assert_eq!(stats.lifts[1].lift, Some(1.0));
/// ```
pub fn auc_and_lift(scored: &mut [(f64, bool)], lift_fractions: &[f64]) -> ScoreStats {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let n = scored.len();
    let mut order: Vec<usize> = (0..lift_fractions.len()).collect();
    order.sort_by(|&a, &b| lift_fractions[a].total_cmp(&lift_fractions[b]));
    let mut lifts: Vec<Option<f64>> = vec![None; lift_fractions.len()];
    let mut next_lift = 0;

    let mut auc = 0.0;
    // Rows 0..i seen so far: x negatives, y positives.
    let (mut i, mut x, mut y) = (0usize, 0u64, 0u64);
    while i < n {
        let score = scored[i].0;
        let (mut i_new, mut x_new, mut y_new) = (i, x, y);
        while i_new < n && scored[i_new].0 == score {
            if scored[i_new].1 {
                y_new += 1;
            } else {
                x_new += 1;
            }
            i_new += 1;
        }
        auc += (y_new + y) as f64 * (x_new - x) as f64;

        while let Some(&k) = order.get(next_lift) {
            let fraction = lift_fractions[k];
            let i_lift = n as f64 * fraction;
            if i_lift <= i as f64 || i_lift > i_new as f64 {
                break;
            }
            let lambda = (i_lift - i as f64) / (i_new - i) as f64;
            let y_lift = y as f64 + (y_new - y) as f64 * lambda;
            lifts[k] = Some(y_lift / fraction);
            next_lift += 1;
        }
        (i, x, y) = (i_new, x_new, y_new);
    }

    let positives = y as f64;
    ScoreStats {
        auc: (x > 0 && y > 0).then(|| auc / (2.0 * x as f64 * positives)),
        lifts: lift_fractions
            .iter()
            .zip(lifts)
            .map(|(&fraction, lift)| LiftAt {
                fraction,
                lift: lift.filter(|_| y > 0).map(|l| l / positives),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensei_data::Shard;

    #[test]
    fn test_perfect_and_inverted_ranking() {
        let mut perfect = vec![(0.9, true), (0.8, true), (0.1, false), (0.0, false)];
        assert_eq!(auc_and_lift(&mut perfect, &[]).auc, Some(1.0));
        let mut inverted = vec![(0.9, false), (0.8, false), (0.1, true), (0.0, true)];
        assert_eq!(auc_and_lift(&mut inverted, &[]).auc, Some(0.0));
    }

    #[test]
    fn test_ties_count_half() {
        let mut tied = vec![(1.0, true), (1.0, false), (1.0, true), (1.0, false)];
        let stats = auc_and_lift(&mut tied, &[0.5]);
        assert_eq!(stats.auc, Some(0.5));
        // Half-way through one tie of two positives out of four rows.
        assert_eq!(stats.lifts[0].lift, Some(1.0));
    }

    #[test]
    fn test_single_class_has_no_auc() {
        let mut only_positive = vec![(1.0, true), (0.0, true)];
        let stats = auc_and_lift(&mut only_positive, &[1.0]);
        assert_eq!(stats.auc, None);
        assert_eq!(stats.lifts[0].lift, Some(1.0));

        let mut only_negative = vec![(1.0, false)];
        let stats = auc_and_lift(&mut only_negative, &[1.0]);
        assert_eq!(stats.auc, None);
        assert_eq!(stats.lifts[0].lift, None);
        assert_eq!(auc_and_lift(&mut [], &[0.5]).lifts[0].lift, None);
    }

    #[test]
    fn test_unsorted_lift_fractions_keep_their_order() {
        let mut scored = vec![(3.0, true), (2.0, false), (1.0, true), (0.0, false)];
        let stats = auc_and_lift(&mut scored, &[0.5, 0.25]);
        assert_eq!(stats.lifts[0].fraction, 0.5);
        assert_eq!(stats.lifts[0].lift, Some(1.0));
        assert_eq!(stats.lifts[1].lift, Some(2.0));
    }

    #[test]
    fn test_score_stats_reads_labels_in_shard_order() {
        let mut first = Shard::new();
        first.add_row(&[], 1.0, 0);
        let mut second = Shard::new();
        second.add_row(&[], -1.0, 1);
        let mut shards = ShardSet::new();
        shards.shards_mut().extend([first, second]);
        assert_eq!(score_stats(&shards, &[2.0, 1.0], &[]).auc, Some(1.0));
        assert_eq!(score_stats(&shards, &[1.0, 2.0], &[]).auc, Some(0.0));
    }
}
