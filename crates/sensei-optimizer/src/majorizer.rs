//! Quadratic majorizers of the logistic loss.

use sensei_core::concurrency::{split_evenly, WorkerPool};
use sensei_core::util::sign;
use sensei_core::{JRenumbering, Renumber, J};
use sensei_data::{RowExtender, Stats};
use tracing::info;

use crate::logs::{LogRecord, PassLogger, UpdateMinimumLog};
use crate::model::Model;
use crate::regularization::Regularizations;

/// One-dimensional quadratic upper bound of the loss along feature `j`:
///
/// `f(w) = (a/4 + L2) w^2 + (b - a w0)/2 w + L1 |w| + c`
///
/// `L1`, `L2` and the tangent point `w0` live outside; `c` is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dim1Majorizer {
    a: f64,
    b: f64,
}

impl Dim1Majorizer {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    pub fn set_zero(&mut self) {
        *self = Self::default();
    }

    pub fn add(&mut self, that: &Dim1Majorizer) {
        self.a += that.a;
        self.b += that.b;
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    /// Minimizer of the regularized majorizer.
    ///
    /// `inertia` is added before the l1 soft threshold.
    pub fn get_minimum(
        &self,
        regularizations: &Regularizations,
        w0: f64,
        inertia: f64,
        step_multiplier: f64,
        rows_with_j: u64,
    ) -> f64 {
        let aj = self.a + regularizations.l2(rows_with_j, self.a) * 4.0;
        let mut bj = self.a * w0 - step_multiplier * self.b + inertia * aj;
        let l1 = regularizations.l1(rows_with_j, w0, self.a) * 2.0;
        bj = if bj > 0.0 {
            (bj - l1).max(0.0)
        } else {
            (bj + l1).min(0.0)
        };
        if aj == 0.0 {
            debug_assert_eq!(bj, 0.0);
            return 0.0;
        }
        bj / aj
    }

    /// Curvature estimate of the loss along `j`.
    pub fn precision(&self, regularizations: &Regularizations, rows_with_j: u64) -> f64 {
        self.a / 2.0 + regularizations.l2(rows_with_j, self.a) * 2.0
    }

    /// `f'(w0)` of the unregularized part.
    pub fn derivative_at_w0(&self) -> f64 {
        self.b / 2.0
    }
}

/// Per-feature [`Dim1Majorizer`]s of a whole data set, plus its log loss.
///
/// Majorizers built at the same weights on disjoint rows add up to the
/// majorizer of the union, so rows can be accumulated in any order and on
/// any thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Majorizer {
    of_j: Vec<Dim1Majorizer>,
    log_loss: f64,
    cpu_operation_count_flat_materialization: u64,
}

impl Majorizer {
    pub fn new(feature_count: usize) -> Self {
        Self {
            of_j: vec![Dim1Majorizer::default(); feature_count],
            ..Self::default()
        }
    }

    pub fn size(&self) -> usize {
        self.of_j.len()
    }

    pub fn set_size(&mut self, size: usize) {
        self.of_j.resize(size, Dim1Majorizer::default());
    }

    pub fn set_zero(&mut self) {
        self.of_j.iter_mut().for_each(Dim1Majorizer::set_zero);
        self.log_loss = 0.0;
        self.cpu_operation_count_flat_materialization = 0;
    }

    pub fn of_j(&self, j: J) -> &Dim1Majorizer {
        &self.of_j[j as usize]
    }

    #[inline]
    pub fn add(&mut self, j: J, majorizer: &Dim1Majorizer) {
        self.of_j[j as usize].add(majorizer);
    }

    #[inline]
    pub fn add_log_loss(&mut self, delta: f64) {
        self.log_loss += delta;
    }

    pub fn log_loss(&self) -> f64 {
        self.log_loss
    }

    pub fn add_to_cpu_operation_count(&mut self, delta: u64) {
        self.cpu_operation_count_flat_materialization += delta;
    }

    pub fn cpu_operation_count_flat_materialization(&self) -> u64 {
        self.cpu_operation_count_flat_materialization
    }

    /// Adds the tangent majorizer of one materialized row at weights `w`
    /// and returns the row's `w . x`.
    ///
    /// With `m = y w.x` the row contributes `ln(1 + e^-m)` to the log loss
    /// and, for every active `j`, `A |x|^2` to `a` and `(A m - 1) y` to `b`,
    /// where `A = tanh(m/2) / m` (0.5 at `m = 0`).
    pub fn add_row(&mut self, row: &RowExtender<'_>, w: &[f64]) -> f64 {
        let wx = row.dot(w);
        let y = row.y();
        let wxy = wx * y;
        let curvature = if wxy.abs() < 1e-10 {
            0.5
        } else {
            (wxy / 2.0).tanh() / wxy
        };
        self.log_loss += log1p_exp(-wxy);
        let d = Dim1Majorizer::new(
            curvature * row.l2_squared_norm(),
            (curvature * wxy - 1.0) * y,
        );
        for &j in row.sparse_bool() {
            self.of_j[j as usize].add(&d);
        }
        self.cpu_operation_count_flat_materialization += row.operation_count();
        wx
    }

    /// Overwrites `self` with the sum of `parts`.
    ///
    /// Coordinates are split into disjoint ranges, one per worker, so no
    /// coordinate is written by two threads.
    pub fn sum_and_assign(&mut self, parts: &[Majorizer], workers: &WorkerPool) {
        let size = self.of_j.len();
        for part in parts {
            assert_eq!(part.size(), size, "summing majorizers of different sizes");
        }
        let mut tasks = Vec::with_capacity(workers.thread_count());
        let mut rest = self.of_j.as_mut_slice();
        for range in split_evenly(size, workers.thread_count()) {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(range.len());
            tasks.push((range.start, head));
            rest = tail;
        }
        workers.par_for(tasks, false, |(start, chunk)| {
            for (k, d) in chunk.iter_mut().enumerate() {
                d.set_zero();
                for part in parts {
                    d.add(&part.of_j[start + k]);
                }
            }
        });
        self.log_loss = parts.iter().map(|p| p.log_loss).sum();
        self.cpu_operation_count_flat_materialization = parts
            .iter()
            .map(|p| p.cpu_operation_count_flat_materialization)
            .sum();
    }

    /// Regularization part of the total loss at `w`.
    pub fn regularization_loss(
        &self,
        regularizations: &Regularizations,
        w: &[f64],
        stats: &Stats,
    ) -> f64 {
        w.iter()
            .enumerate()
            .map(|(j, &w)| {
                let rows_with_j = stats.xj_bool_count_of_j(j as J);
                let a = self.of_j[j].a;
                regularizations.l1(rows_with_j, w, a) * w.abs()
                    + regularizations.l2(rows_with_j, a) * w * w
            })
            .sum()
    }

    /// Partial derivatives of the regularized loss at `w`.
    ///
    /// At `w == 0` the l1 term is a subgradient; the derivative is reported
    /// as 0 when 0 lies inside it.
    pub fn log_loss_derivative_at(
        &self,
        w: &[f64],
        regularizations: &Regularizations,
        stats: &Stats,
    ) -> Vec<f64> {
        assert_eq!(self.of_j.len(), w.len());
        w.iter()
            .enumerate()
            .map(|(j, &w)| {
                let d = &self.of_j[j];
                let rows_with_j = stats.xj_bool_count_of_j(j as J);
                let lld = d.derivative_at_w0() + 2.0 * regularizations.l2(rows_with_j, d.a) * w;
                let l1 = regularizations.l1(rows_with_j, w, d.a);
                if w == 0.0 && lld - l1 <= 0.0 && lld + l1 >= 0.0 {
                    0.0
                } else {
                    lld + l1 * sign(w)
                }
            })
            .collect()
    }

    /// Moves the model to the minimum of this majorizer.
    ///
    /// The majorizer must have been built at the model's current weights.
    /// Two corrections may replace the step:
    ///
    /// - **undo**: with `allow_undo`, if the total loss at the current
    ///   weights is above the previous accepted total, the previous step is
    ///   reverted instead and the loss baseline is reset to infinity;
    /// - **restart**: if the new step points along the previous loss
    ///   derivative, inertia overshot and the step is reverted.
    #[allow(clippy::too_many_arguments)]
    pub fn update_minimum(
        &self,
        regularizations: &Regularizations,
        inertia_factor: f64,
        step_multiplier: f64,
        stats: &Stats,
        allow_undo: bool,
        model: &mut Model,
        logger: &dyn PassLogger,
    ) {
        assert_eq!(self.of_j.len(), model.size(), "majorizer and model sizes differ");
        assert!(model.synced_with_weights, "update_minimum on an unsynced model");
        model.synced_with_weights = false;
        model.iteration_no += 1;

        let mut log = UpdateMinimumLog::default();
        let total_loss = self.log_loss + self.regularization_loss(regularizations, &model.w, stats);

        if allow_undo && total_loss > model.prev_total_loss {
            info!(
                prev_total_loss = model.prev_total_loss,
                total_loss, "undo because of loss increase"
            );
            log.undo_iteration = true;
            model.prev_total_loss = f64::INFINITY;
            model.total_loss = f64::INFINITY;
            for (w, delta_w) in model.w.iter_mut().zip(model.delta_w.iter_mut()) {
                *w -= *delta_w;
                *delta_w = 0.0;
            }
            logger.add_to_logs(&LogRecord::UpdateMinimum(log));
            return;
        }

        let mut dot = 0.0;
        let mut loss_derivative_squared = 0.0;
        let mut delta_w_squared = 0.0;
        for (j, d) in self.of_j.iter().enumerate() {
            let rows_with_j = stats.xj_bool_count_of_j(j as J);
            let w0 = model.w[j];
            let new_w = d.get_minimum(
                regularizations,
                w0,
                inertia_factor * model.delta_w[j],
                step_multiplier,
                rows_with_j,
            );
            model.precision[j] = d.precision(regularizations, rows_with_j);
            model.delta_w[j] = new_w - w0;
            model.w[j] = new_w;
            let ld = model.loss_derivative[j];
            dot += ld * model.delta_w[j];
            loss_derivative_squared += ld * ld;
            delta_w_squared += model.delta_w[j] * model.delta_w[j];
        }
        log.dot_loss_derivative_vs_delta_weight = dot;
        let denominator = (loss_derivative_squared * delta_w_squared).sqrt();
        if denominator != 0.0 {
            log.cos_angle_loss_derivative_vs_delta_weight = Some(dot / denominator);
        }

        // Without inertia the step always points against the derivative.
        if dot > 0.0 {
            info!(dot, "restart");
            log.restart_iteration = true;
            for (w, delta_w) in model.w.iter_mut().zip(model.delta_w.iter_mut()) {
                *w -= *delta_w;
                *delta_w = 0.0;
            }
        }
        logger.add_to_logs(&LogRecord::UpdateMinimum(log));
    }
}

/// `ln(1 + e^x)` without overflow for large `x`.
#[inline]
fn log1p_exp(x: f64) -> f64 {
    if x > 35.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

impl Renumber for Majorizer {
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        renumbering.renumber_indices(&mut self.of_j);
    }
}
