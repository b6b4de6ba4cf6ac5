use crowd_beans::io::*;
use crowd_beans::simulate::{generate_glad_data, GladSimArgs};

use clap::Args;
use log::info;

#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// output file prefix
    #[arg(long, short = 'o', required = true)]
    out: Box<str>,

    /// number of tasks
    #[arg(long, default_value_t = 100)]
    tasks: usize,

    /// number of workers
    #[arg(long, default_value_t = 10)]
    workers: usize,

    /// number of labels
    #[arg(long, default_value_t = 2)]
    labels: usize,

    /// distinct workers answering each task
    #[arg(long, default_value_t = 5)]
    answers_per_task: usize,

    /// mean of worker abilities
    #[arg(long, default_value_t = 1.0)]
    alpha_mean: f64,

    /// standard deviation of worker abilities
    #[arg(long, default_value_t = 1.0)]
    alpha_sd: f64,

    /// mean of task log-inverse-difficulties
    #[arg(long, default_value_t = 1.0)]
    beta_mean: f64,

    /// standard deviation of task log-inverse-difficulties
    #[arg(long, default_value_t = 0.5)]
    beta_sd: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    rseed: u64,
}

pub fn run_sim(args: &SimArgs) -> anyhow::Result<()> {
    mkdir(&args.out)?;

    let sim = generate_glad_data(&GladSimArgs {
        tasks: args.tasks,
        workers: args.workers,
        labels: args.labels,
        answers_per_task: args.answers_per_task,
        alpha_mean: args.alpha_mean,
        alpha_sd: args.alpha_sd,
        beta_mean: args.beta_mean,
        beta_sd: args.beta_sd,
        rseed: args.rseed,
    })?;

    let data_file = format!("{}.data.tsv.gz", args.out);
    write_crowd_labels(&sim.data, &data_file)?;

    let truth_file = format!("{}.truth.tsv.gz", args.out);
    let mut lines: Vec<Box<str>> = vec!["task\tlabel".into()];
    lines.extend(
        sim.truth
            .iter()
            .map(|(t, z)| format!("{}\t{}", t, z).into_boxed_str()),
    );
    write_lines(&lines, &truth_file)?;

    let alphas_file = format!("{}.alphas.tsv.gz", args.out);
    write_name_values(
        sim.alphas.iter().map(|(w, a)| (w, *a)),
        ("worker", "alpha"),
        &alphas_file,
    )?;

    let betas_file = format!("{}.betas.tsv.gz", args.out);
    write_name_values(
        sim.betas.iter().map(|(t, b)| (t, *b)),
        ("task", "beta"),
        &betas_file,
    )?;

    info!(
        "Wrote {}, {}, {}, {}",
        data_file, truth_file, alphas_file, betas_file
    );

    let param_file = format!("{}.parameters.json", args.out);
    let params = serde_json::json!({
        "command": "simulate",
        "num_tasks": args.tasks,
        "num_workers": args.workers,
        "num_labels": args.labels,
        "answers_per_task": args.answers_per_task,
        "alpha_mean": args.alpha_mean,
        "alpha_sd": args.alpha_sd,
        "beta_mean": args.beta_mean,
        "beta_sd": args.beta_sd,
        "seed": args.rseed,
        "num_observations": sim.data.num_observations(),
    });
    std::fs::write(&param_file, serde_json::to_string_pretty(&params)?)?;
    info!("Wrote parameters: {}", param_file);

    info!("simulate completed successfully");
    Ok(())
}
