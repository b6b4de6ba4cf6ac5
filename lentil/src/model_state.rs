use crowd_beans::{CrowdLabels, NameIndex};

use ndarray::Array1;
use std::collections::HashMap;

/// Prior mean of every `alpha` and `beta` unless overridden
pub const DEFAULT_PRIOR_MEAN: f64 = 1.0;

/// Initial value of every `alpha` and `beta`
pub const INITIAL_PARAM: f64 = 1.0;

/// The fixed, ordered set of candidate labels.
///
/// Observed labels are mapped onto candidate indices. Candidates come
/// from the supplied label priors (in the order given) or, without
/// priors, from the observed labels in order of first appearance.
#[derive(Debug, Clone)]
pub struct LabelSet {
    names: Vec<Box<str>>,
    candidate_of_observed: Vec<usize>,
}

impl LabelSet {
    /// Resolve the candidate labels and the class prior `p`
    ///
    /// * `data` - observation table
    /// * `priors` - optional `(label, probability)` pairs
    ///
    /// Supplied priors are validated (finite, non-negative, positive
    /// total, no duplicates, covering every observed label) and
    /// rescaled to sum to one.
    pub fn resolve(
        data: &CrowdLabels,
        priors: Option<&[(Box<str>, f64)]>,
    ) -> anyhow::Result<(Self, Array1<f64>)> {
        let observed = data.labels();

        let Some(priors) = priors else {
            let kk = observed.len();
            let names = observed.names().to_vec();
            let candidate_of_observed = (0..kk).collect();
            let p = Array1::from_elem(kk, 1.0 / kk as f64);
            return Ok((
                LabelSet {
                    names,
                    candidate_of_observed,
                },
                p,
            ));
        };

        let mut candidates = NameIndex::new();
        let mut p = Vec::with_capacity(priors.len());
        for (name, prob) in priors {
            if !prob.is_finite() || *prob < 0.0 {
                anyhow::bail!("invalid prior probability {} for label `{}`", prob, name);
            }
            if candidates.get(name).is_some() {
                anyhow::bail!("label `{}` appears twice in the label priors", name);
            }
            candidates.intern(name);
            p.push(*prob);
        }

        let total: f64 = p.iter().sum();
        if total <= 0.0 {
            anyhow::bail!("label priors sum to {}, expected a positive total", total);
        }
        if (total - 1.0).abs() > 1e-8 {
            log::warn!("label priors sum to {}; rescaling to one", total);
        }
        let p = Array1::from_vec(p) / total;

        let candidate_of_observed = observed
            .names()
            .iter()
            .map(|name| {
                candidates.get(name).ok_or_else(|| {
                    anyhow::anyhow!("observed label `{}` is missing from the label priors", name)
                })
            })
            .collect::<anyhow::Result<Vec<usize>>>()?;

        Ok((
            LabelSet {
                names: candidates.names().to_vec(),
                candidate_of_observed,
            },
            p,
        ))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[Box<str>] {
        &self.names
    }

    /// Candidate index of the `l`-th observed label
    pub fn candidate(&self, l: usize) -> usize {
        self.candidate_of_observed[l]
    }
}

/// Per-identifier prior means, defaulting to [`DEFAULT_PRIOR_MEAN`]
///
/// * `names` - workers or tasks
/// * `supplied` - optional overrides keyed by name
/// * `what` - noun for error messages
pub fn resolve_prior_means(
    names: &NameIndex,
    supplied: Option<&HashMap<Box<str>, f64>>,
    what: &str,
) -> anyhow::Result<Array1<f64>> {
    let mut means = Array1::from_elem(names.len(), DEFAULT_PRIOR_MEAN);
    if let Some(supplied) = supplied {
        for (name, &value) in supplied {
            let i = names
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("prior mean given for unknown {} `{}`", what, name))?;
            if !value.is_finite() {
                anyhow::bail!("non-finite prior mean {} for {} `{}`", value, what, name);
            }
            means[i] = value;
        }
    }
    Ok(means)
}

/// Current parameter estimates of one fit.
///
/// * `alpha` - worker abilities, indexed like `CrowdLabels::workers`
/// * `beta` - task log-inverse-difficulties, indexed like
///   `CrowdLabels::tasks`; the model uses `exp(beta)`
/// * `priors` - class prior over candidate labels
/// * `alpha_prior_mean`, `beta_prior_mean` - means of the unit-variance
///   Gaussian priors
///
/// The lengths of `alpha` and `beta` are fixed at construction; only
/// their values change during a fit.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub alpha: Array1<f64>,
    pub beta: Array1<f64>,
    pub priors: Array1<f64>,
    pub alpha_prior_mean: Array1<f64>,
    pub beta_prior_mean: Array1<f64>,
}

impl ModelState {
    /// Start every `alpha` and `beta` at [`INITIAL_PARAM`]
    pub fn new(
        priors: Array1<f64>,
        alpha_prior_mean: Array1<f64>,
        beta_prior_mean: Array1<f64>,
    ) -> Self {
        ModelState {
            alpha: Array1::from_elem(alpha_prior_mean.len(), INITIAL_PARAM),
            beta: Array1::from_elem(beta_prior_mean.len(), INITIAL_PARAM),
            priors,
            alpha_prior_mean,
            beta_prior_mean,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.alpha.len()
    }

    pub fn num_tasks(&self) -> usize {
        self.beta.len()
    }

    pub fn num_labels(&self) -> usize {
        self.priors.len()
    }

    /// `[alpha..., beta...]` as one flat vector
    pub fn pack(&self) -> Vec<f64> {
        self.alpha.iter().chain(self.beta.iter()).cloned().collect()
    }

    /// Inverse of [`ModelState::pack`]
    pub fn unpack(&mut self, x: &[f64]) -> anyhow::Result<()> {
        let nw = self.num_workers();
        if x.len() != nw + self.num_tasks() {
            anyhow::bail!(
                "parameter vector has length {}, expected {}",
                x.len(),
                nw + self.num_tasks()
            );
        }
        self.alpha.assign(&ndarray::ArrayView1::from(&x[..nw]));
        self.beta.assign(&ndarray::ArrayView1::from(&x[nw..]));
        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.alpha.iter().chain(self.beta.iter()).all(|x| x.is_finite())
    }
}
