//! Expected complete-data log-likelihood and its gradient.
//!
//! For a row `(i, c)` of the joined table with `ab = alpha(w) * exp(beta(t))`
//!
//! ```text
//! loglik(i, c) = log sigmoid(ab)                     if delta(i, c)
//!              = log(1 - sigmoid(ab)) - log(K - 1)   otherwise
//!
//! Q = sum_{i,c} posterior(i, c) * loglik(i, c)
//!   + sum_w log N(alpha(w); alpha0(w), 1)
//!   + sum_t log N(beta(t); beta0(t), 1)
//! ```
//!
//! Gradient (the `exp(beta)` factor comes from `beta -> exp(beta)`):
//!
//! ```text
//! dQ/dbeta(t)  = sum_{i in t} sum_c posterior(i,c) (delta(i,c) - sigmoid(ab)) alpha(w) exp(beta(t))
//!                - (beta(t) - beta0(t))
//! dQ/dalpha(w) = sum_{i in w} sum_c posterior(i,c) (delta(i,c) - sigmoid(ab)) exp(beta(t))
//!                - (alpha(w) - alpha0(w))
//! ```

use crate::joined_observations::JoinedObservations;
use crate::model_state::ModelState;
use crate::stable_math::{sigmoid, stable_softplus_array, SOFTPLUS_LIMIT};

use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Per-observation log-probabilities of a matching and a non-matching
/// answer, `(log sigmoid(ab), log(1 - sigmoid(ab)) - log(K - 1))`.
///
/// With `K = 1` the second term is `-inf`, but no row ever takes it.
pub fn answer_log_probs(
    alpha_beta: &Array1<f64>,
    num_labels: usize,
) -> (Array1<f64>, Array1<f64>) {
    let log_match = -stable_softplus_array(&alpha_beta.mapv(|x| -x), SOFTPLUS_LIMIT);
    let log_miss = if num_labels > 1 {
        let ln_other = ((num_labels - 1) as f64).ln();
        -stable_softplus_array(alpha_beta, SOFTPLUS_LIMIT) - ln_other
    } else {
        Array1::from_elem(alpha_beta.len(), f64::NEG_INFINITY)
    };
    (log_match, log_miss)
}

/// Sum of unit-variance Gaussian log-densities `log N(x; mu, 1)`
fn gaussian_log_prior(xx: ArrayView1<f64>, mu: &Array1<f64>) -> f64 {
    xx.iter()
        .zip(mu.iter())
        .map(|(&x, &m)| -LN_SQRT_2PI - 0.5 * (x - m) * (x - m))
        .sum()
}

/// `Q` and `dQ` for a fixed joined table (posteriors, structure) as a
/// function of `alpha` and `beta`.
pub struct Objective<'a> {
    joined: &'a JoinedObservations,
    alpha_prior_mean: &'a Array1<f64>,
    beta_prior_mean: &'a Array1<f64>,
}

impl<'a> Objective<'a> {
    pub fn new(joined: &'a JoinedObservations, state: &'a ModelState) -> Self {
        Objective {
            joined,
            alpha_prior_mean: &state.alpha_prior_mean,
            beta_prior_mean: &state.beta_prior_mean,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.joined.num_workers()
    }

    pub fn num_tasks(&self) -> usize {
        self.joined.num_tasks()
    }

    fn alpha_beta(&self, alpha: ArrayView1<f64>, beta: ArrayView1<f64>) -> Array1<f64> {
        let jj = self.joined;
        Array1::from_shape_fn(jj.num_observations(), |i| {
            alpha[jj.worker(i)] * beta[jj.task(i)].exp()
        })
    }

    /// Expected complete-data log-likelihood. A NaN anywhere in the sum
    /// turns into `-inf`.
    pub fn value(&self, alpha: ArrayView1<f64>, beta: ArrayView1<f64>) -> f64 {
        let jj = self.joined;
        let alpha_beta = self.alpha_beta(alpha, beta);
        let (log_match, log_miss) = answer_log_probs(&alpha_beta, jj.num_labels());
        let posterior = jj.posterior();

        let expected: f64 = (0..jj.num_observations())
            .into_par_iter()
            .map(|i| {
                posterior
                    .row(i)
                    .iter()
                    .enumerate()
                    .map(|(c, &w)| {
                        if jj.delta(i, c) {
                            w * log_match[i]
                        } else {
                            w * log_miss[i]
                        }
                    })
                    .sum::<f64>()
            })
            .sum();

        let q = expected
            + gaussian_log_prior(alpha, self.alpha_prior_mean)
            + gaussian_log_prior(beta, self.beta_prior_mean);

        if q.is_nan() {
            f64::NEG_INFINITY
        } else {
            q
        }
    }

    /// `(dQ/dalpha, dQ/dbeta)`, grouped by worker and by task
    pub fn gradient(
        &self,
        alpha: ArrayView1<f64>,
        beta: ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let jj = self.joined;
        let posterior = jj.posterior();

        // d loglik / d(alpha exp(beta)) summed over candidates, times exp(beta)
        let dq_dalpha_row: Vec<f64> = (0..jj.num_observations())
            .into_par_iter()
            .map(|i| {
                let exp_beta = beta[jj.task(i)].exp();
                let sigma = sigmoid(alpha[jj.worker(i)] * exp_beta);
                let resid: f64 = posterior
                    .row(i)
                    .iter()
                    .enumerate()
                    .map(|(c, &w)| {
                        let delta = if jj.delta(i, c) { 1.0 } else { 0.0 };
                        w * (delta - sigma)
                    })
                    .sum();
                resid * exp_beta
            })
            .collect();

        let dalpha: Vec<f64> = (0..jj.num_workers())
            .into_par_iter()
            .map(|w| {
                let s: f64 = jj
                    .worker_observations(w)
                    .iter()
                    .map(|&i| dq_dalpha_row[i])
                    .sum();
                s - (alpha[w] - self.alpha_prior_mean[w])
            })
            .collect();

        let dbeta: Vec<f64> = (0..jj.num_tasks())
            .into_par_iter()
            .map(|t| {
                let s: f64 = jj
                    .task_observations(t)
                    .iter()
                    .map(|&i| dq_dalpha_row[i] * alpha[jj.worker(i)])
                    .sum();
                s - (beta[t] - self.beta_prior_mean[t])
            })
            .collect();

        (Array1::from_vec(dalpha), Array1::from_vec(dbeta))
    }

    /// Split a packed `[alpha..., beta...]` vector
    pub fn split<'x>(&self, x: &'x [f64]) -> (ArrayView1<'x, f64>, ArrayView1<'x, f64>) {
        let nw = self.num_workers();
        (ArrayView1::from(&x[..nw]), ArrayView1::from(&x[nw..]))
    }

    /// `Q` at a packed parameter vector
    pub fn value_at(&self, x: &[f64]) -> f64 {
        let (alpha, beta) = self.split(x);
        self.value(alpha, beta)
    }

    /// `[dQ/dalpha..., dQ/dbeta...]` at a packed parameter vector
    pub fn gradient_at(&self, x: &[f64]) -> Vec<f64> {
        let (alpha, beta) = self.split(x);
        let (dalpha, dbeta) = self.gradient(alpha, beta);
        dalpha.iter().chain(dbeta.iter()).cloned().collect()
    }
}

/// `Q` at the current state
pub fn compute_q(joined: &JoinedObservations, state: &ModelState) -> f64 {
    Objective::new(joined, state).value(state.alpha.view(), state.beta.view())
}
