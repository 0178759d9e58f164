use std::fs::read_to_string;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use linebalance::Problem;
use linebalance::config::{Config, EngineKind};

/// Balance an assembly line with station types.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Problem description (YAML)
    input: PathBuf,

    /// Run configuration (TOML, or YAML by extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured solver engine
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Override the configured time limit, in seconds
    #[arg(long)]
    time_limit: Option<f64>,

    /// Also write the model as a free MPS file
    #[arg(long)]
    mps: Option<PathBuf>,

    /// Report up to this many alternative assignments
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    alternatives: Option<u64>,

    /// Debug logging and verbose validation
    #[arg(short, long)]
    verbose: bool,
}

fn init_logger(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(engine) = cli.engine {
        config.solver.engine = engine;
    }
    if let Some(seconds) = cli.time_limit {
        config.solver.time_limit_seconds = Some(seconds);
    }
    if cli.verbose {
        config.validation.verbose = true;
    }

    init_logger(&config.log_level, cli.verbose);
    tracing::debug!(?config, "configuration loaded");

    let buf = read_to_string(&cli.input)?;
    let problem: Problem = serde_yaml::from_str(&buf)?;

    if let Some(path) = &cli.mps {
        problem.export_mps(path)?;
        tracing::info!(path = %path.display(), "model written");
    }

    match cli.alternatives {
        Some(count) => {
            let solutions = problem.enumerate(&config, usize::try_from(count)?)?;
            println!("{}", serde_yaml::to_string(&solutions)?);
        }
        None => {
            let solution = problem.balance(&config)?;
            println!("{}", serde_yaml::to_string(&solution)?);
        }
    }
    Ok(())
}
