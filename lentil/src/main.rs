mod run_fit;
mod run_sim;

use run_fit::*;
use run_sim::*;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lentil")]
#[command(about = "Latent Estimation of Noisy Truths In Labelling")]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate crowd labels with the GLAD model (worker ability x task difficulty)
    Fit(FitArgs),
    /// Simulate crowd labels from the GLAD generative model
    Simulate(SimArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Fit(args) => {
            run_fit(args)?;
        }
        Commands::Simulate(args) => {
            run_sim(args)?;
        }
    }

    Ok(())
}
