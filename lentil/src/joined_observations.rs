//! Observations joined against every candidate label.
//!
//! Conceptually one row per `(observation, candidate)` pair, carrying
//!
//! ```text
//! (task, worker, observed, candidate) -> (alpha, beta, delta, posterior)
//! ```
//!
//! with `delta = [observed == candidate]`. The identifier columns and the
//! task/worker adjacency lists are fixed at construction. Only `alpha`,
//! `beta` (re-joined from [`ModelState`]) and `posterior` (broadcast from
//! the per-task label posteriors) are rewritten between EM steps.

use crate::model_state::{LabelSet, ModelState};
use crowd_beans::CrowdLabels;

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Axis};

#[derive(Debug, Clone)]
pub struct JoinedObservations {
    task: Vec<usize>,
    worker: Vec<usize>,
    /// candidate index of the observed label
    label: Vec<usize>,
    num_labels: usize,
    task_observations: Vec<Vec<usize>>,
    worker_observations: Vec<Vec<usize>>,
    alpha: Array1<f64>,
    beta: Array1<f64>,
    posterior: Array2<f64>,
}

impl JoinedObservations {
    /// Join the observations with the candidate labels and the current
    /// parameters. Posteriors start at zero until the first E-step.
    pub fn build(data: &CrowdLabels, labels: &LabelSet, state: &ModelState) -> Self {
        let nobs = data.num_observations();
        let mut task = Vec::with_capacity(nobs);
        let mut worker = Vec::with_capacity(nobs);
        let mut label = Vec::with_capacity(nobs);

        for obs in data.observations() {
            task.push(obs.task);
            worker.push(obs.worker);
            label.push(labels.candidate(obs.label));
        }

        let task_observations = (0..data.num_tasks())
            .map(|t| data.task_observations(t).to_vec())
            .collect();
        let worker_observations = (0..data.num_workers())
            .map(|w| data.worker_observations(w).to_vec())
            .collect();

        let mut ret = JoinedObservations {
            task,
            worker,
            label,
            num_labels: labels.len(),
            task_observations,
            worker_observations,
            alpha: Array1::zeros(nobs),
            beta: Array1::zeros(nobs),
            posterior: Array2::zeros((nobs, labels.len())),
        };
        ret.refresh_parameters(state);
        ret
    }

    /// Re-join `alpha` by worker and `beta` by task
    pub fn refresh_parameters(&mut self, state: &ModelState) {
        for (i, (a, b)) in self.alpha.iter_mut().zip(self.beta.iter_mut()).enumerate() {
            *a = state.alpha[self.worker[i]];
            *b = state.beta[self.task[i]];
        }
    }

    /// Broadcast task-level label posteriors (tasks x candidates) onto
    /// every observation row of the task
    pub fn set_posteriors(&mut self, probas: &Array2<f64>) {
        let task = &self.task;
        self.posterior
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| row.assign(&probas.row(task[i])));
    }

    /// Number of `(observation, candidate)` rows
    pub fn num_rows(&self) -> usize {
        self.num_observations() * self.num_labels
    }

    pub fn num_observations(&self) -> usize {
        self.task.len()
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn num_tasks(&self) -> usize {
        self.task_observations.len()
    }

    pub fn num_workers(&self) -> usize {
        self.worker_observations.len()
    }

    pub fn task(&self, i: usize) -> usize {
        self.task[i]
    }

    pub fn worker(&self, i: usize) -> usize {
        self.worker[i]
    }

    /// Candidate index of the label observed in row `i`
    pub fn label(&self, i: usize) -> usize {
        self.label[i]
    }

    /// Match indicator of row `(i, c)`
    #[inline]
    pub fn delta(&self, i: usize, c: usize) -> bool {
        self.label[i] == c
    }

    pub fn task_observations(&self, t: usize) -> &[usize] {
        &self.task_observations[t]
    }

    pub fn worker_observations(&self, w: usize) -> &[usize] {
        &self.worker_observations[w]
    }

    pub fn alpha(&self) -> &Array1<f64> {
        &self.alpha
    }

    pub fn beta(&self) -> &Array1<f64> {
        &self.beta
    }

    /// observations x candidates
    pub fn posterior(&self) -> &Array2<f64> {
        &self.posterior
    }

    /// `alpha * exp(beta)` of every observation
    pub fn alpha_beta(&self) -> Array1<f64> {
        &self.alpha * &self.beta.mapv(f64::exp)
    }
}
