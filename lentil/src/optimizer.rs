//! Smooth unconstrained minimization behind a narrow interface.
//!
//! The M-step only needs "start here, minimize this cost with this
//! gradient, give me back the best point". [`ConjugateGradient`] does
//! it with argmin's nonlinear conjugate gradient (Polak-Ribiere+) and a
//! More-Thuente line search, stopping at an iteration budget or once the
//! largest absolute gradient entry falls below a tolerance.

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, IterState, Problem, Solver, State,
    TerminationReason, TerminationStatus, KV,
};
use argmin::solver::conjugategradient::beta::PolakRibierePlus;
use argmin::solver::conjugategradient::NonlinearConjugateGradient;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use log::debug;
use std::sync::Mutex;

/// restart along the steepest descent every this many iterations
const RESTART_ITERS: u64 = 10;
/// restart when successive gradients lose orthogonality
const RESTART_ORTHOGONALITY: f64 = 0.1;

/// What a [`Minimizer`] hands back
#[derive(Debug, Clone)]
pub struct MinimizerOut {
    /// best parameters found (the starting point if nothing better)
    pub x: Vec<f64>,
    /// cost at `x`
    pub cost: f64,
    /// optimizer iterations used
    pub iterations: u64,
    /// true if the optimizer's own tolerance was met
    pub converged: bool,
    /// human-readable termination reason
    pub message: String,
}

pub trait Minimizer {
    /// Minimize `cost` starting from `x0`, with `grad` its gradient.
    ///
    /// Running out of iterations is not an error; the best point so far
    /// is returned.
    fn minimize<F, G>(&self, x0: Vec<f64>, cost: F, grad: G) -> anyhow::Result<MinimizerOut>
    where
        F: Fn(&[f64]) -> f64 + Sync,
        G: Fn(&[f64]) -> Vec<f64> + Sync;
}

/// Nonlinear conjugate gradient with an iteration budget and a
/// gradient (infinity-norm) tolerance
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    pub max_iter: u64,
    pub grad_tol: f64,
}

impl ConjugateGradient {
    pub fn new(max_iter: u64, grad_tol: f64) -> Self {
        ConjugateGradient { max_iter, grad_tol }
    }
}

/// Lowest finite cost evaluated so far and where
#[derive(Debug)]
struct BestSeen {
    cost: f64,
    x: Option<Vec<f64>>,
}

impl BestSeen {
    fn new() -> Self {
        BestSeen {
            cost: f64::INFINITY,
            x: None,
        }
    }

    fn record(&mut self, x: &[f64], cost: f64) {
        if cost.is_finite() && cost < self.cost {
            self.cost = cost;
            self.x = Some(x.to_vec());
        }
    }

    /// The best point if it is no worse than the start
    fn or_start(self, x0: Vec<f64>, cost0: f64) -> (Vec<f64>, f64) {
        match self.x {
            Some(x) if self.cost <= cost0 => (x, self.cost),
            _ => (x0, cost0),
        }
    }
}

struct FnProblem<'a, F, G> {
    cost: F,
    grad: G,
    best: &'a Mutex<BestSeen>,
}

impl<F, G> CostFunction for FnProblem<'_, F, G>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let c = (self.cost)(param);
        if let Ok(mut best) = self.best.lock() {
            best.record(param, c);
        }
        Ok(c)
    }
}

impl<F, G> Gradient for FnProblem<'_, F, G>
where
    G: Fn(&[f64]) -> Vec<f64>,
{
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        Ok((self.grad)(param))
    }
}

type CgState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Wraps a gradient-based solver and declares convergence once
/// `max_k |g_k| <= grad_tol`
struct GradientTolerance<S> {
    inner: S,
    grad_tol: f64,
}

fn inf_norm(xx: &[f64]) -> f64 {
    xx.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

impl<O, S> Solver<O, CgState> for GradientTolerance<S>
where
    S: Solver<O, CgState>,
{
    const NAME: &'static str = "Nonlinear conjugate gradient with gradient tolerance";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        state: CgState,
    ) -> Result<(CgState, Option<KV>), ArgminError> {
        self.inner.init(problem, state)
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: CgState,
    ) -> Result<(CgState, Option<KV>), ArgminError> {
        self.inner.next_iter(problem, state)
    }

    fn terminate(&mut self, state: &CgState) -> TerminationStatus {
        let status = self.inner.terminate(state);
        if status.terminated() {
            return status;
        }
        match state.get_gradient() {
            Some(g) if inf_norm(g) <= self.grad_tol => {
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            }
            _ => TerminationStatus::NotTerminated,
        }
    }
}

impl Minimizer for ConjugateGradient {
    fn minimize<F, G>(&self, x0: Vec<f64>, cost: F, grad: G) -> anyhow::Result<MinimizerOut>
    where
        F: Fn(&[f64]) -> f64 + Sync,
        G: Fn(&[f64]) -> Vec<f64> + Sync,
    {
        let best = Mutex::new(BestSeen::new());
        let problem = FnProblem {
            cost,
            grad,
            best: &best,
        };
        let cost0 = (problem.cost)(&x0);

        if self.max_iter == 0 {
            return Ok(MinimizerOut {
                x: x0,
                cost: cost0,
                iterations: 0,
                converged: false,
                message: "no iterations allowed".into(),
            });
        }

        if inf_norm(&(problem.grad)(&x0)) <= self.grad_tol {
            return Ok(MinimizerOut {
                x: x0,
                cost: cost0,
                iterations: 0,
                converged: true,
                message: "gradient below tolerance at the start".into(),
            });
        }

        let linesearch = MoreThuenteLineSearch::new().with_c(1e-4, 0.4)?;
        let ncg = NonlinearConjugateGradient::new(linesearch, PolakRibierePlus::new())
            .restart_iters(RESTART_ITERS)
            .restart_orthogonality(RESTART_ORTHOGONALITY);
        let solver = GradientTolerance {
            inner: ncg,
            grad_tol: self.grad_tol,
        };

        let init = x0.clone();
        let max_iter = self.max_iter;
        match Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(max_iter))
            .run()
        {
            Ok(res) => {
                let state = res.state();
                let status = state.get_termination_status();
                let converged = matches!(
                    status,
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                );
                let message = format!("{:?}", status);
                let iterations = state.get_iter();
                let best_cost = state.get_best_cost();
                match state.get_best_param() {
                    Some(x) if best_cost <= cost0 => Ok(MinimizerOut {
                        x: x.clone(),
                        cost: best_cost,
                        iterations,
                        converged,
                        message,
                    }),
                    _ => Ok(MinimizerOut {
                        x: x0,
                        cost: cost0,
                        iterations,
                        converged,
                        message,
                    }),
                }
            }
            Err(e) => {
                // degenerate line searches end up here
                debug!("optimizer stopped early: {}", e);
                let seen = match best.lock() {
                    Ok(mut b) => std::mem::replace(&mut *b, BestSeen::new()),
                    Err(_) => BestSeen::new(),
                };
                let (x, cost) = seen.or_start(x0, cost0);
                Ok(MinimizerOut {
                    x,
                    cost,
                    iterations: 0,
                    converged: false,
                    message: format!("optimizer error: {}", e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn quadratic(x: &[f64]) -> f64 {
        (x[0] - 3.0).powi(2) + 10.0 * (x[1] + 1.0).powi(2) + 0.5 * x[0] * x[1]
    }

    fn quadratic_grad(x: &[f64]) -> Vec<f64> {
        vec![2.0 * (x[0] - 3.0) + 0.5 * x[1], 20.0 * (x[1] + 1.0) + 0.5 * x[0]]
    }

    #[test]
    fn minimizes_a_quadratic() -> anyhow::Result<()> {
        let cg = ConjugateGradient::new(200, 1e-6);
        let out = cg.minimize(vec![0.0, 0.0], quadratic, quadratic_grad)?;

        // 2 x0 + 0.5 x1 = 6, 0.5 x0 + 20 x1 = -20
        let det = 2.0 * 20.0 - 0.25;
        let x0 = (6.0 * 20.0 - 0.5 * -20.0) / det;
        let x1 = (2.0 * -20.0 - 0.5 * 6.0) / det;
        assert_abs_diff_eq!(out.x[0], x0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.x[1], x1, epsilon = 1e-3);
        assert!(out.cost < quadratic(&[0.0, 0.0]));
        Ok(())
    }

    #[test]
    fn budget_is_respected() -> anyhow::Result<()> {
        let cg = ConjugateGradient::new(1, 1e-12);
        let out = cg.minimize(vec![10.0, 10.0], quadratic, quadratic_grad)?;
        assert!(out.iterations <= 1);
        assert!(!out.converged, "ran out of budget: {}", out.message);
        assert!(out.cost <= quadratic(&[10.0, 10.0]));
        Ok(())
    }

    #[test]
    fn stationary_start_is_returned() -> anyhow::Result<()> {
        let cg = ConjugateGradient::new(10, 1e-3);
        let out = cg.minimize(
            vec![1.0, -2.0],
            |x| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2),
            |x| vec![2.0 * (x[0] - 1.0), 2.0 * (x[1] + 2.0)],
        )?;
        assert!(out.converged);
        assert_eq!(out.iterations, 0);
        assert_abs_diff_eq!(out.x[0], 1.0);
        Ok(())
    }

    #[test]
    fn zero_budget_keeps_the_start() -> anyhow::Result<()> {
        let cg = ConjugateGradient::new(0, 1e-3);
        let out = cg.minimize(vec![5.0, 5.0], quadratic, quadratic_grad)?;
        assert_eq!(out.x, vec![5.0, 5.0]);
        assert!(!out.converged);
        Ok(())
    }

    #[test]
    fn cost_evaluations_keep_the_best_point() -> anyhow::Result<()> {
        let best = Mutex::new(BestSeen::new());
        let problem = FnProblem {
            cost: quadratic,
            grad: quadratic_grad,
            best: &best,
        };
        problem.cost(&vec![10.0, 10.0])?;
        problem.cost(&vec![3.0, -1.0])?;
        problem.cost(&vec![0.0, 0.0])?;
        drop(problem);

        let best = best.into_inner().unwrap();
        assert_eq!(best.x, Some(vec![3.0, -1.0]));
        assert_abs_diff_eq!(best.cost, quadratic(&[3.0, -1.0]));

        let (x, cost) = best.or_start(vec![0.0, 0.0], quadratic(&[0.0, 0.0]));
        assert_eq!(x, vec![3.0, -1.0]);
        assert_abs_diff_eq!(cost, quadratic(&[3.0, -1.0]));
        Ok(())
    }

    #[test]
    fn non_finite_costs_fall_back_to_the_start() {
        let mut best = BestSeen::new();
        best.record(&[1.0], f64::NAN);
        best.record(&[2.0], f64::NEG_INFINITY);
        assert!(best.x.is_none());

        let (x, cost) = best.or_start(vec![0.5], 4.0);
        assert_eq!(x, vec![0.5]);
        assert_eq!(cost, 4.0);

        let mut worse = BestSeen::new();
        worse.record(&[7.0], 9.0);
        assert_eq!(worse.or_start(vec![0.5], 4.0).0, vec![0.5]);
    }
}
