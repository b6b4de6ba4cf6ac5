//! M-step: maximize `Q` over `alpha` and `beta` with the posteriors
//! held fixed, by minimizing `-Q`.

use crate::joined_observations::JoinedObservations;
use crate::model_state::ModelState;
use crate::objective::Objective;
use crate::optimizer::{Minimizer, MinimizerOut};

use log::debug;

/// Run the minimizer from the current `alpha`/`beta`, write the best
/// point back into `state` and re-join it into `joined`.
///
/// Falls back to the starting point when the minimizer finds nothing
/// better, so `Q` never decreases here.
pub fn m_step<M: Minimizer>(
    joined: &mut JoinedObservations,
    state: &mut ModelState,
    minimizer: &M,
) -> anyhow::Result<MinimizerOut> {
    let x0 = state.pack();
    let out = {
        let objective = Objective::new(joined, state);
        minimizer.minimize(
            x0,
            |x| -objective.value_at(x),
            |x| objective.gradient_at(x).into_iter().map(|g| -g).collect(),
        )?
    };

    debug!(
        "M-step: -Q = {:.6} after {} iterations ({})",
        out.cost, out.iterations, out.message
    );

    state.unpack(&out.x)?;
    joined.refresh_parameters(state);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estep::e_step;
    use crate::model_state::{resolve_prior_means, LabelSet};
    use crate::objective::compute_q;
    use crate::optimizer::ConjugateGradient;
    use crowd_beans::CrowdLabels;

    fn setup() -> (JoinedObservations, ModelState) {
        let data = CrowdLabels::from_triplets(vec![
            ("t1", "w1", "A"),
            ("t1", "w2", "A"),
            ("t1", "w3", "B"),
            ("t2", "w1", "B"),
            ("t2", "w2", "B"),
            ("t2", "w3", "B"),
            ("t3", "w1", "A"),
            ("t3", "w3", "B"),
        ])
        .unwrap();
        let (labels, p) = LabelSet::resolve(&data, None).unwrap();
        let state = ModelState::new(
            p,
            resolve_prior_means(data.workers(), None, "worker").unwrap(),
            resolve_prior_means(data.tasks(), None, "task").unwrap(),
        );
        let joined = JoinedObservations::build(&data, &labels, &state);
        (joined, state)
    }

    #[test]
    fn q_does_not_decrease() -> anyhow::Result<()> {
        let (mut joined, mut state) = setup();
        let cg = ConjugateGradient::new(25, 1e-2);

        for _ in 0..3 {
            e_step(&mut joined, &state);
            let before = compute_q(&joined, &state);
            m_step(&mut joined, &mut state, &cg)?;
            let after = compute_q(&joined, &state);
            assert!(after >= before - 1e-12, "{} -> {}", before, after);
        }
        Ok(())
    }

    #[test]
    fn parameters_are_rejoined() -> anyhow::Result<()> {
        let (mut joined, mut state) = setup();
        e_step(&mut joined, &state);
        m_step(&mut joined, &mut state, &ConjugateGradient::new(25, 1e-2))?;

        for i in 0..joined.num_observations() {
            assert_eq!(joined.alpha()[i], state.alpha[joined.worker(i)]);
            assert_eq!(joined.beta()[i], state.beta[joined.task(i)]);
        }
        Ok(())
    }

    #[test]
    fn zero_budget_leaves_state_alone() -> anyhow::Result<()> {
        let (mut joined, mut state) = setup();
        e_step(&mut joined, &state);
        let before = state.pack();
        m_step(&mut joined, &mut state, &ConjugateGradient::new(0, 1e-2))?;
        assert_eq!(state.pack(), before);
        Ok(())
    }
}
