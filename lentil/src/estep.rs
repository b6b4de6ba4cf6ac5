//! E-step: posterior over the true label of every task.
//!
//! ```text
//! log q(t, c) = log p(c) + sum_{i in t} loglik(i, c)
//! q(t, .)     = softmax(log q(t, .))
//! ```

use crate::joined_observations::JoinedObservations;
use crate::model_state::ModelState;
use crate::objective::answer_log_probs;
use crate::stable_math::stable_log_softmax_normalize;

use ndarray::parallel::prelude::*;
use ndarray::{Array2, Axis};

/// Recompute label posteriors from the joined `alpha`/`beta` columns
/// and the class prior.
///
/// Writes the posteriors back into every row of `joined` and returns
/// the `tasks x candidates` posterior matrix. Non-finite parameters
/// propagate into the result unchecked.
pub fn e_step(joined: &mut JoinedObservations, state: &ModelState) -> Array2<f64> {
    let kk = joined.num_labels();
    let (log_match, log_miss) = answer_log_probs(&joined.alpha_beta(), kk);
    let log_prior = state.priors.mapv(f64::ln);

    let mut log_probas = Array2::<f64>::zeros((joined.num_tasks(), kk));
    {
        let jj = &*joined;
        log_probas
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(t, mut row)| {
                for &i in jj.task_observations(t) {
                    let observed = jj.label(i);
                    for (c, x) in row.iter_mut().enumerate() {
                        *x += if c == observed {
                            log_match[i]
                        } else {
                            log_miss[i]
                        };
                    }
                }
                row += &log_prior;
            });
    }

    stable_log_softmax_normalize(&mut log_probas);
    joined.set_posteriors(&log_probas);
    log_probas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_state::{resolve_prior_means, LabelSet};
    use approx::assert_abs_diff_eq;
    use crowd_beans::CrowdLabels;
    use ndarray::array;

    fn setup(priors: Option<&[(Box<str>, f64)]>) -> (JoinedObservations, ModelState) {
        let data = CrowdLabels::from_triplets(vec![
            ("t1", "w1", "A"),
            ("t1", "w2", "A"),
            ("t1", "w3", "B"),
            ("t2", "w1", "B"),
            ("t2", "w2", "B"),
            ("t3", "w3", "A"),
        ])
        .unwrap();
        let (labels, p) = LabelSet::resolve(&data, priors).unwrap();
        let state = ModelState::new(
            p,
            resolve_prior_means(data.workers(), None, "worker").unwrap(),
            resolve_prior_means(data.tasks(), None, "task").unwrap(),
        );
        let joined = JoinedObservations::build(&data, &labels, &state);
        (joined, state)
    }

    #[test]
    fn posteriors_sum_to_one() {
        let (mut joined, state) = setup(None);
        let probas = e_step(&mut joined, &state);
        assert_eq!(probas.dim(), (3, 2));
        for row in probas.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
        // the joined posterior of each row is its task's distribution
        for i in 0..joined.num_observations() {
            let t = joined.task(i);
            assert_eq!(joined.posterior().row(i), probas.row(t));
        }
    }

    #[test]
    fn matches_hand_computation() {
        let (mut joined, state) = setup(None);
        let probas = e_step(&mut joined, &state);

        // alpha = beta = 1: every answer is right w.p. sigmoid(e)
        let s = 1.0 / (1.0 + (-(1f64.exp())).exp());
        // t1: A, A, B
        let score_a = s * s * (1.0 - s);
        let score_b = (1.0 - s) * (1.0 - s) * s;
        assert_abs_diff_eq!(probas[[0, 0]], score_a / (score_a + score_b), epsilon = 1e-12);
        // t3: a single A
        assert_abs_diff_eq!(probas[[2, 0]], s, epsilon = 1e-12);
    }

    #[test]
    fn repeated_e_step_is_idempotent() {
        let (mut joined, mut state) = setup(None);
        state.alpha = array![2.0, -1.0, 0.3];
        state.beta = array![0.5, -0.2, 1.5];
        joined.refresh_parameters(&state);

        let first = e_step(&mut joined, &state);
        let joined_first = joined.posterior().clone();
        let second = e_step(&mut joined, &state);

        assert_eq!(first, second);
        assert_eq!(&joined_first, joined.posterior());
    }

    #[test]
    fn priors_shift_the_posterior() {
        let skewed: Vec<(Box<str>, f64)> = vec![("A".into(), 0.9), ("B".into(), 0.1)];
        let (mut joined, state) = setup(Some(skewed.as_slice()));
        let probas = e_step(&mut joined, &state);

        let (mut joined_flat, state_flat) = setup(None);
        let flat = e_step(&mut joined_flat, &state_flat);

        for t in 0..3 {
            assert!(probas[[t, 0]] > flat[[t, 0]]);
        }
    }

    #[test]
    fn zero_prior_rules_out_a_label() {
        let priors: Vec<(Box<str>, f64)> =
            vec![("A".into(), 0.5), ("B".into(), 0.5), ("C".into(), 0.0)];
        let (mut joined, state) = setup(Some(priors.as_slice()));
        let probas = e_step(&mut joined, &state);
        assert_eq!(probas.ncols(), 3);
        for row in probas.rows() {
            assert_eq!(row[2], 0.0);
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
    }
}
