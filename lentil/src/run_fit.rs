use crowd_beans::io::*;
use crowd_beans::{CrowdLabels, NameIndex};
use lentil::{FitStatus, Glad, GladFit, GladOptions};

use clap::Args;
use log::info;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// observation table with `task`, `worker`, `label` columns
    /// (plain text or `.gz`)
    #[arg(required = true)]
    data_file: Box<str>,

    /// output file prefix
    #[arg(long, short = 'o', required = true)]
    out: Box<str>,

    /// maximum number of EM iterations
    #[arg(long, default_value_t = 100)]
    n_iter: usize,

    /// stop once the per-row objective improves by less than this
    #[arg(long, default_value_t = 1e-5)]
    tol: f64,

    /// iteration budget of the conjugate-gradient M-step
    #[arg(long, default_value_t = 25)]
    m_step_max_iter: u64,

    /// gradient tolerance of the conjugate-gradient M-step
    #[arg(long, default_value_t = 1e-2)]
    m_step_tol: f64,

    /// label prior file, each line `label probability`; the file order
    /// defines the label order
    #[arg(long)]
    label_priors: Option<Box<str>>,

    /// prior mean of worker abilities: a number for every worker, or a
    /// file of `worker mean` lines
    #[arg(long)]
    alpha_prior_mean: Option<Box<str>>,

    /// prior mean of task log-inverse-difficulties: a number for every
    /// task, or a file of `task mean` lines
    #[arg(long)]
    beta_prior_mean: Option<Box<str>>,

    /// field delimiter of the data file (default: any whitespace)
    #[arg(long)]
    delim: Option<Box<str>>,

    /// the data file has no header; columns are task, worker, label
    #[arg(long, default_value_t = false)]
    no_header: bool,

    /// show a progress bar
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// maximum number of threads
    #[arg(long, default_value_t = 16)]
    max_threads: usize,
}

/// A number applies to every name; anything else is read as a
/// `name value` file
fn read_prior_means(arg: &str, names: &NameIndex) -> anyhow::Result<HashMap<Box<str>, f64>> {
    if let Ok(value) = arg.parse::<f64>() {
        return Ok(names.names().iter().map(|x| (x.clone(), value)).collect());
    }

    let mut ret = HashMap::new();
    for (name, value) in read_name_values(arg)? {
        if ret.insert(name.clone(), value).is_some() {
            anyhow::bail!("{}: `{}` appears more than once", arg, name);
        }
    }
    Ok(ret)
}

fn build_options(args: &FitArgs, data: &CrowdLabels) -> anyhow::Result<GladOptions> {
    let labels_priors = match args.label_priors.as_deref() {
        Some(file) => Some(read_name_values(file)?),
        None => None,
    };

    let alphas_priors_mean = args
        .alpha_prior_mean
        .as_deref()
        .map(|x| read_prior_means(x, data.workers()))
        .transpose()?;

    let betas_priors_mean = args
        .beta_prior_mean
        .as_deref()
        .map(|x| read_prior_means(x, data.tasks()))
        .transpose()?;

    Ok(GladOptions {
        n_iter: args.n_iter,
        tol: args.tol,
        silent: !args.progress,
        labels_priors,
        alphas_priors_mean,
        betas_priors_mean,
        m_step_max_iter: args.m_step_max_iter,
        m_step_tol: args.m_step_tol,
    })
}

fn write_results(fit: &GladFit, out: &str) -> anyhow::Result<()> {
    let labels_file = format!("{}.labels.tsv.gz", out);
    write_name_rows(fit.named_labels(), ("task", "label"), &labels_file)?;

    let probas_file = format!("{}.probas.tsv.gz", out);
    let mut lines: Vec<Box<str>> = Vec::with_capacity(fit.probas.nrows() + 1);
    let header: Vec<&str> = std::iter::once("task")
        .chain(fit.labels.iter().map(|x| x.as_ref()))
        .collect();
    lines.push(header.join("\t").into_boxed_str());
    for (task, row) in fit.tasks.names().iter().zip(fit.probas.rows()) {
        let values: Vec<String> = row.iter().map(|x| x.to_string()).collect();
        lines.push(format!("{}\t{}", task, values.join("\t")).into_boxed_str());
    }
    write_lines(&lines, &probas_file)?;

    let alphas_file = format!("{}.alphas.tsv.gz", out);
    write_name_values(
        fit.workers.names().iter().zip(fit.alphas.iter().cloned()),
        ("worker", "alpha"),
        &alphas_file,
    )?;

    let betas_file = format!("{}.betas.tsv.gz", out);
    write_name_values(
        fit.tasks.names().iter().zip(fit.betas.iter().cloned()),
        ("task", "beta"),
        &betas_file,
    )?;

    let loss_file = format!("{}.loss.tsv.gz", out);
    write_name_values(
        (1..=fit.loss_history.len()).zip(fit.loss_history.iter().cloned()),
        ("iteration", "loss"),
        &loss_file,
    )?;

    info!(
        "Wrote {}, {}, {}, {}, {}",
        labels_file, probas_file, alphas_file, betas_file, loss_file
    );
    Ok(())
}

fn write_name_rows<'a, I>(rows: I, header: (&str, &str), output_file: &str) -> anyhow::Result<()>
where
    I: Iterator<Item = (&'a str, &'a str)>,
{
    let mut lines: Vec<Box<str>> = vec![format!("{}\t{}", header.0, header.1).into()];
    lines.extend(rows.map(|(a, b)| format!("{}\t{}", a, b).into_boxed_str()));
    write_lines(&lines, output_file)
}

/// Run record: inputs, the options the fit actually used, and the outcome
fn fit_parameters(
    args: &FitArgs,
    data: &CrowdLabels,
    glad: &Glad,
    fit: &GladFit,
) -> serde_json::Value {
    let (converged, iterations) = match fit.status {
        FitStatus::Converged { iterations } => (true, iterations),
        FitStatus::IterationLimitReached => (false, fit.num_iterations()),
    };
    let options = glad.options();

    serde_json::json!({
        "command": "fit",
        "data_file": &args.data_file,
        "num_observations": data.num_observations(),
        "num_tasks": data.num_tasks(),
        "num_workers": data.num_workers(),
        "labels": fit.labels.iter().map(|x| x.as_ref()).collect::<Vec<&str>>(),
        "n_iter": options.n_iter,
        "tol": options.tol,
        "m_step_max_iter": options.m_step_max_iter,
        "m_step_tol": options.m_step_tol,
        "label_priors": args.label_priors.as_deref(),
        "alpha_prior_mean": args.alpha_prior_mean.as_deref(),
        "beta_prior_mean": args.beta_prior_mean.as_deref(),
        "converged": converged,
        "iterations": iterations,
        "final_loss": fit.loss_history.last(),
    })
}

pub fn run_fit(args: &FitArgs) -> anyhow::Result<()> {
    let max_threads = num_cpus::get().min(args.max_threads);

    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;

    info!("will use {} threads", rayon::current_num_threads());

    mkdir(&args.out)?;

    let data = read_crowd_labels(&args.data_file, args.delim.as_deref(), !args.no_header)?;
    info!(
        "Read {} observations of {} tasks by {} workers from {}",
        data.num_observations(),
        data.num_tasks(),
        data.num_workers(),
        args.data_file
    );

    let glad = Glad::new(build_options(args, &data)?);
    let fit = glad.fit(&data)?;

    write_results(&fit, &args.out)?;

    let param_file = format!("{}.parameters.json", args.out);
    let params = fit_parameters(args, &data, &glad, &fit);
    std::fs::write(&param_file, serde_json::to_string_pretty(&params)?)?;
    info!("Wrote parameters: {}", param_file);

    info!("fit completed successfully");
    Ok(())
}
