//! Log-domain numeric primitives.
//!
//! # Softplus
//!
//! ```text
//! softplus(x) = log(1 + exp(x))
//!             = x                 if x > limit
//!             = log1p(exp(x))     if |x| <= limit
//!             = 0                 if x < -limit
//! ```
//!
//! With `limit = 30` the truncation error on either side is below 1e-13.

use ndarray::parallel::prelude::*;
use ndarray::{Array, Array2, ArrayBase, ArrayView1, Axis, Data, Dimension};

/// Default cutoff beyond which softplus switches to its asymptote
pub const SOFTPLUS_LIMIT: f64 = 30.0;

/// `log(1 + exp(x))` without overflow; `exp` is never evaluated
/// outside `[-limit, limit]`.
#[inline]
pub fn stable_softplus(x: f64, limit: f64) -> f64 {
    if x > limit {
        x
    } else if x < -limit {
        0.0
    } else {
        x.exp().ln_1p()
    }
}

/// Element-wise [`stable_softplus`]
pub fn stable_softplus_array<S, D>(xx: &ArrayBase<S, D>, limit: f64) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    xx.mapv(|x| stable_softplus(x, limit))
}

/// Logistic function, evaluated on the side that cannot overflow
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let exp_x = x.exp();
        exp_x / (1.0 + exp_x)
    }
}

/// `log(sum(exp(x)))` shifted by the largest element
pub fn log_sum_exp(xx: ArrayView1<f64>) -> f64 {
    let max_val = xx.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    let sum: f64 = xx.iter().map(|&x| (x - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Turn log-scores into probabilities, one group per row: every row
/// `r` becomes `exp(r - log_sum_exp(r))` and sums to one.
pub fn stable_log_softmax_normalize(log_scores: &mut Array2<f64>) {
    log_scores
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let lse = log_sum_exp(row.view());
            row.mapv_inplace(|x| (x - lse).exp());
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::{array, Array1};

    #[test]
    fn softplus_large_positive_is_identity() {
        for &x in &[30.5, 31.0, 100.0, 1e6, 1e300] {
            assert_relative_eq!(stable_softplus(x, SOFTPLUS_LIMIT), x, max_relative = 1e-12);
        }
    }

    #[test]
    fn softplus_large_negative_vanishes() {
        for &x in &[-30.5, -100.0, -1e6, -1e300] {
            let y = stable_softplus(x, SOFTPLUS_LIMIT);
            assert!(y >= 0.0 && y < 1e-13);
        }
    }

    #[test]
    fn softplus_matches_log1p_exp_in_moderate_range() {
        let xx = Array1::linspace(-10.0, 10.0, 201);
        let yy = stable_softplus_array(&xx, SOFTPLUS_LIMIT);
        for (&x, &y) in xx.iter().zip(yy.iter()) {
            assert_abs_diff_eq!(y, x.exp().ln_1p(), epsilon = 1e-10);
        }
    }

    #[test]
    fn softplus_is_continuous_at_the_limit() {
        let below = stable_softplus(SOFTPLUS_LIMIT, SOFTPLUS_LIMIT);
        let above = stable_softplus(SOFTPLUS_LIMIT + 1e-9, SOFTPLUS_LIMIT);
        assert_abs_diff_eq!(below, above, epsilon = 1e-8);
        assert!(stable_softplus(-SOFTPLUS_LIMIT, SOFTPLUS_LIMIT) < 1e-13);
    }

    #[test]
    fn sigmoid_tails() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
        assert_abs_diff_eq!(sigmoid(800.0), 1.0);
        assert_abs_diff_eq!(sigmoid(-800.0), 0.0);
        assert_abs_diff_eq!(sigmoid(2.0) + sigmoid(-2.0), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn log_sum_exp_of_large_scores() {
        let xx = array![1000.0, 1000.0];
        assert_abs_diff_eq!(log_sum_exp(xx.view()), 1000.0 + 2f64.ln(), epsilon = 1e-10);

        let yy = array![f64::NEG_INFINITY, f64::NEG_INFINITY];
        assert_eq!(log_sum_exp(yy.view()), f64::NEG_INFINITY);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let mut scores = array![[-1000.0, -1001.0, -1002.5], [3.0, 700.0, -2.0], [0.0, 0.0, 0.0]];
        stable_log_softmax_normalize(&mut scores);
        for row in scores.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            assert!(row.iter().all(|p| p.is_finite() && *p >= 0.0));
        }
        assert_abs_diff_eq!(scores[[2, 1]], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn softmax_is_shift_invariant() {
        let base = array![[0.3, -1.2, 2.5, 0.0], [10.0, 10.5, 9.0, -3.0]];
        let mut a = base.clone();
        let mut b = base.mapv(|x| x + 123.456);
        stable_log_softmax_normalize(&mut a);
        stable_log_softmax_normalize(&mut b);
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn softmax_keeps_impossible_candidates_at_zero() {
        let mut scores = array![[f64::NEG_INFINITY, -2.0, -3.0]];
        stable_log_softmax_normalize(&mut scores);
        assert_eq!(scores[[0, 0]], 0.0);
        assert_abs_diff_eq!(scores.row(0).sum(), 1.0, epsilon = 1e-12);
    }
}
