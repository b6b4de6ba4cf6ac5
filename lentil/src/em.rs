//! GLAD expectation-maximization.
//!
//! ```text
//! init:  alpha = beta = 1, E-step, Q0 = Q
//! loop:  E-step, M-step, Q = Q / (#observations * #labels)
//!        stop when Q - Q_prev < tol
//! ```

use crate::estep::e_step;
use crate::joined_observations::JoinedObservations;
use crate::model_state::{resolve_prior_means, LabelSet, ModelState};
use crate::mstep::m_step;
use crate::objective::compute_q;
use crate::optimizer::ConjugateGradient;
use crowd_beans::{CrowdLabels, NameIndex};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::HashMap;

/// Options for a GLAD fit.
#[derive(Debug, Clone)]
pub struct GladOptions {
    /// Maximum number of EM iterations. Default: 100
    pub n_iter: usize,
    /// Stop once the per-row `Q` improves by less than this. Default: 1e-5
    pub tol: f64,
    /// Hide the progress bar. Default: true
    pub silent: bool,
    /// Class prior as `(label, probability)`; the order defines the
    /// candidate labels. Default: uniform over observed labels
    pub labels_priors: Option<Vec<(Box<str>, f64)>>,
    /// Per-worker prior means of `alpha`. Default: 1.0 each
    pub alphas_priors_mean: Option<HashMap<Box<str>, f64>>,
    /// Per-task prior means of `beta`. Default: 1.0 each
    pub betas_priors_mean: Option<HashMap<Box<str>, f64>>,
    /// Iteration budget of the M-step optimizer. Default: 25
    pub m_step_max_iter: u64,
    /// Gradient tolerance of the M-step optimizer. Default: 1e-2
    pub m_step_tol: f64,
}

impl Default for GladOptions {
    fn default() -> Self {
        GladOptions {
            n_iter: 100,
            tol: 1e-5,
            silent: true,
            labels_priors: None,
            alphas_priors_mean: None,
            betas_priors_mean: None,
            m_step_max_iter: 25,
            m_step_tol: 1e-2,
        }
    }
}

impl GladOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.tol.is_finite() {
            anyhow::bail!("tol must be finite, got {}", self.tol);
        }
        if !self.m_step_tol.is_finite() || self.m_step_tol < 0.0 {
            anyhow::bail!(
                "m_step_tol must be finite and non-negative, got {}",
                self.m_step_tol
            );
        }
        if self.m_step_max_iter == 0 {
            anyhow::bail!("m_step_max_iter must be positive");
        }
        Ok(())
    }
}

/// How the EM loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// `Q` improved by less than `tol` at this (1-based) iteration
    Converged { iterations: usize },
    /// all `n_iter` iterations ran
    IterationLimitReached,
}

/// Everything a finished fit produces
#[derive(Debug, Clone)]
pub struct GladFit {
    pub tasks: NameIndex,
    pub workers: NameIndex,
    /// candidate labels, in posterior column order
    pub labels: Vec<Box<str>>,
    /// tasks x labels posterior; rows sum to one
    pub probas: Array2<f64>,
    /// most probable label (column of `probas`) of each task
    pub task_labels: Vec<usize>,
    pub alphas: Array1<f64>,
    pub betas: Array1<f64>,
    /// per-row `Q` after each iteration
    pub loss_history: Vec<f64>,
    pub status: FitStatus,
}

impl GladFit {
    /// Most probable label of `task`
    pub fn label_of(&self, task: &str) -> Option<&str> {
        let t = self.tasks.get(task)?;
        Some(self.labels[self.task_labels[t]].as_ref())
    }

    /// Posterior over [`GladFit::labels`] for `task`
    pub fn proba_of(&self, task: &str) -> Option<ArrayView1<'_, f64>> {
        let t = self.tasks.get(task)?;
        Some(self.probas.row(t))
    }

    pub fn alpha_of(&self, worker: &str) -> Option<f64> {
        self.workers.get(worker).map(|w| self.alphas[w])
    }

    pub fn beta_of(&self, task: &str) -> Option<f64> {
        self.tasks.get(task).map(|t| self.betas[t])
    }

    /// EM iterations actually run
    pub fn num_iterations(&self) -> usize {
        self.loss_history.len()
    }

    /// `(task, label)` name pairs in task order
    pub fn named_labels(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.tasks
            .names()
            .iter()
            .zip(self.task_labels.iter())
            .map(|(t, &c)| (t.as_ref(), self.labels[c].as_ref()))
    }
}

/// Index of the largest entry of each row, first one on ties
fn row_argmax(probas: &Array2<f64>) -> Vec<usize> {
    probas
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (c, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = c;
                }
            }
            best
        })
        .collect()
}

/// GLAD aggregator: worker ability and task difficulty
pub struct Glad {
    options: GladOptions,
}

impl Glad {
    pub fn new(options: GladOptions) -> Self {
        Glad { options }
    }

    pub fn options(&self) -> &GladOptions {
        &self.options
    }

    pub fn fit(&self, data: &CrowdLabels) -> anyhow::Result<GladFit> {
        self.fit_with_observer(data, |_, _| {})
    }

    /// Most probable label of every task, in `data.tasks()` order
    pub fn fit_predict(&self, data: &CrowdLabels) -> anyhow::Result<Vec<Box<str>>> {
        let fit = self.fit(data)?;
        Ok(fit
            .task_labels
            .iter()
            .map(|&c| fit.labels[c].clone())
            .collect())
    }

    /// Label posteriors, tasks x candidate labels
    pub fn fit_predict_proba(&self, data: &CrowdLabels) -> anyhow::Result<Array2<f64>> {
        Ok(self.fit(data)?.probas)
    }

    /// Run the EM loop
    ///
    /// * `data` - observations
    /// * `observer` - called as `(iteration, loss)` after every
    ///   completed iteration (1-based)
    pub fn fit_with_observer<F>(&self, data: &CrowdLabels, mut observer: F) -> anyhow::Result<GladFit>
    where
        F: FnMut(usize, f64),
    {
        let opts = &self.options;
        opts.validate()?;

        if data.num_observations() == 0 {
            anyhow::bail!("no observations to aggregate");
        }

        let (labels, priors) = LabelSet::resolve(data, opts.labels_priors.as_deref())?;
        let alpha_prior_mean =
            resolve_prior_means(data.workers(), opts.alphas_priors_mean.as_ref(), "worker")?;
        let beta_prior_mean =
            resolve_prior_means(data.tasks(), opts.betas_priors_mean.as_ref(), "task")?;

        let mut state = ModelState::new(priors, alpha_prior_mean, beta_prior_mean);
        let mut joined = JoinedObservations::build(data, &labels, &state);
        let minimizer = ConjugateGradient::new(opts.m_step_max_iter, opts.m_step_tol);

        info!(
            "GLAD: {} observations, {} tasks, {} workers, {} labels",
            data.num_observations(),
            data.num_tasks(),
            data.num_workers(),
            labels.len()
        );

        let mut probas = e_step(&mut joined, &state);
        let mut q = compute_q(&joined, &state);
        let num_rows = joined.num_rows() as f64;

        let pb = ProgressBar::new(opts.n_iter as u64).with_style(
            ProgressStyle::with_template("GLAD {bar:40} {pos}/{len} iterations {msg}")?
                .progress_chars("##-"),
        );
        if opts.silent {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut loss_history = Vec::with_capacity(opts.n_iter);
        let mut status = FitStatus::IterationLimitReached;

        for iter in 1..=opts.n_iter {
            let last_q = q;

            probas = e_step(&mut joined, &state);
            m_step(&mut joined, &mut state, &minimizer)?;
            q = compute_q(&joined, &state) / num_rows;

            if !q.is_finite() || !state.is_finite() {
                anyhow::bail!(
                    "non-finite parameters or objective (Q = {}) at iteration {}",
                    q,
                    iter
                );
            }

            loss_history.push(q);
            observer(iter, q);
            pb.set_message(format!("Q = {:.6}", q));
            pb.inc(1);
            debug!("[{}] Q = {:.8}, delta = {:.3e}", iter, q, q - last_q);

            if q - last_q < opts.tol {
                status = FitStatus::Converged { iterations: iter };
                break;
            }
        }
        pb.finish_and_clear();

        match status {
            FitStatus::Converged { iterations } => {
                info!("GLAD converged after {} iterations", iterations)
            }
            FitStatus::IterationLimitReached => {
                info!("GLAD reached the iteration limit ({})", opts.n_iter)
            }
        }

        let task_labels = row_argmax(&probas);

        Ok(GladFit {
            tasks: data.tasks().clone(),
            workers: data.workers().clone(),
            labels: labels.names().to_vec(),
            probas,
            task_labels,
            alphas: state.alpha,
            betas: state.beta,
            loss_history,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn argmax_prefers_the_first_tie() {
        let probas = array![[0.5, 0.5], [0.2, 0.8], [0.4, 0.3]];
        assert_eq!(row_argmax(&probas), vec![0, 1, 0]);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let data = CrowdLabels::from_triplets(vec![("t", "w", "A")]).unwrap();

        let nan_tol = GladOptions {
            tol: f64::NAN,
            ..Default::default()
        };
        assert!(Glad::new(nan_tol).fit(&data).is_err());

        let no_budget = GladOptions {
            m_step_max_iter: 0,
            ..Default::default()
        };
        assert!(Glad::new(no_budget).fit(&data).is_err());
    }

    #[test]
    fn observer_sees_every_iteration() -> anyhow::Result<()> {
        let data = CrowdLabels::from_triplets(vec![
            ("t1", "w1", "A"),
            ("t1", "w2", "A"),
            ("t2", "w1", "B"),
            ("t2", "w2", "A"),
        ])?;
        let mut seen = vec![];
        let fit = Glad::new(GladOptions::default())
            .fit_with_observer(&data, |iter, loss| seen.push((iter, loss)))?;

        assert_eq!(seen.len(), fit.loss_history.len());
        for (k, (iter, loss)) in seen.iter().enumerate() {
            assert_eq!(*iter, k + 1);
            assert_eq!(*loss, fit.loss_history[k]);
        }
        Ok(())
    }
}
