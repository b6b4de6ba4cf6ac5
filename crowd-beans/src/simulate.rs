use crate::observations::CrowdLabels;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

pub struct GladSimArgs {
    pub tasks: usize,
    pub workers: usize,
    pub labels: usize,
    pub answers_per_task: usize,
    pub alpha_mean: f64,
    pub alpha_sd: f64,
    pub beta_mean: f64,
    pub beta_sd: f64,
    pub rseed: u64,
}

impl Default for GladSimArgs {
    fn default() -> Self {
        GladSimArgs {
            tasks: 100,
            workers: 10,
            labels: 2,
            answers_per_task: 5,
            alpha_mean: 1.0,
            alpha_sd: 1.0,
            beta_mean: 1.0,
            beta_sd: 0.5,
            rseed: 42,
        }
    }
}

pub struct GladSimOut {
    pub data: CrowdLabels,
    /// `(task, true label)` for every task
    pub truth: Vec<(Box<str>, Box<str>)>,
    /// `(worker, alpha)` for every worker
    pub alphas: Vec<(Box<str>, f64)>,
    /// `(task, beta)` for every task; `exp(beta)` is the inverse difficulty
    pub betas: Vec<(Box<str>, f64)>,
}

fn task_name(j: usize) -> Box<str> {
    format!("t{}", j).into()
}

fn worker_name(i: usize) -> Box<str> {
    format!("w{}", i).into()
}

fn label_name(k: usize) -> Box<str> {
    format!("c{}", k).into()
}

/// Sample crowd answers from the GLAD generative model
///
/// ```text
/// z(j) ~ Uniform{1..K}
/// alpha(i) ~ N(alpha_mean, alpha_sd^2), beta(j) ~ N(beta_mean, beta_sd^2)
/// y(i,j) = z(j)                  with prob. sigmoid(alpha(i) * exp(beta(j)))
///        ~ Uniform{k != z(j)}    otherwise
/// ```
///
/// Each task is answered by `answers_per_task` distinct workers drawn
/// uniformly at random.
pub fn generate_glad_data(args: &GladSimArgs) -> anyhow::Result<GladSimOut> {
    if args.labels < 2 {
        anyhow::bail!("need at least two labels to simulate, got {}", args.labels);
    }
    if args.tasks == 0 || args.workers == 0 || args.answers_per_task == 0 {
        anyhow::bail!("tasks, workers and answers per task should be positive");
    }
    if args.answers_per_task > args.workers {
        anyhow::bail!(
            "answers per task ({}) cannot exceed the number of workers ({})",
            args.answers_per_task,
            args.workers
        );
    }

    let mut rng = StdRng::seed_from_u64(args.rseed);
    let alpha_dist = Normal::new(args.alpha_mean, args.alpha_sd)?;
    let beta_dist = Normal::new(args.beta_mean, args.beta_sd)?;

    let alphas: Vec<f64> = (0..args.workers)
        .map(|_| alpha_dist.sample(&mut rng))
        .collect();
    let betas: Vec<f64> = (0..args.tasks).map(|_| beta_dist.sample(&mut rng)).collect();
    let truth: Vec<usize> = (0..args.tasks)
        .map(|_| rng.random_range(0..args.labels))
        .collect();

    let mut triplets = Vec::with_capacity(args.tasks * args.answers_per_task);

    for (j, (&z, &beta)) in truth.iter().zip(betas.iter()).enumerate() {
        let answered_by = rand::seq::index::sample(&mut rng, args.workers, args.answers_per_task);
        for i in answered_by.iter() {
            let p_correct = 1.0 / (1.0 + (-alphas[i] * beta.exp()).exp());
            let y = if rng.random::<f64>() < p_correct {
                z
            } else {
                let other = rng.random_range(0..(args.labels - 1));
                if other >= z {
                    other + 1
                } else {
                    other
                }
            };
            triplets.push((task_name(j), worker_name(i), label_name(y)));
        }
    }

    info!(
        "simulated {} answers: {} tasks, {} workers, {} labels",
        triplets.len(),
        args.tasks,
        args.workers,
        args.labels
    );

    Ok(GladSimOut {
        data: CrowdLabels::from_triplets(triplets)?,
        truth: truth
            .into_iter()
            .enumerate()
            .map(|(j, z)| (task_name(j), label_name(z)))
            .collect(),
        alphas: alphas
            .into_iter()
            .enumerate()
            .map(|(i, a)| (worker_name(i), a))
            .collect(),
        betas: betas
            .into_iter()
            .enumerate()
            .map(|(j, b)| (task_name(j), b))
            .collect(),
    })
}
