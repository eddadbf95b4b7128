//! ml-offline CLI
//!
//! `extract` pulls the configured event window into the snapshot file,
//! `train` builds and publishes a model from it, `models` lists what has
//! been published.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use gathr_ml_offline::{
    list_models, run_extract, run_train, LogFormat, PersistenceError, PgEventSource,
    PipelineConfig, PipelineError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ml-offline")]
#[command(author = "Gathr Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline training pipeline for the plan-join conversion model", long_about = None)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the lookback window from the event store into the snapshot file
    Extract,
    /// Train on the snapshot file and publish the model with its metrics
    Train,
    /// List published model versions and their metrics
    Models,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match PipelineConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ml-offline: {err}");
            return ExitCode::from(PipelineError::from(err).exit_code());
        }
    };

    if let Err(err) = init_logging(&config, cli.verbose) {
        eprintln!("ml-offline: {err}");
    }

    match run(&cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            error!(exit_code = code, error = %err, "command failed");
            eprintln!("ml-offline: {}", describe_failure(&err, &config));
            ExitCode::from(code)
        }
    }
}

async fn run(command: &Commands, config: &PipelineConfig) -> Result<(), PipelineError> {
    match command {
        Commands::Extract => {
            let source = PgEventSource::new(&config.database);
            let artifact = run_extract(config, &source).await?;
            println!("wrote {} rows to {}", artifact.rows, artifact.path.display());
        }
        Commands::Train => {
            let outcome = run_train(config)?;
            let m = &outcome.metrics;
            println!(
                "published {} (accuracy={:.4} auc={:.4}{} log_loss={:.4} train={} eval={})",
                outcome.artifact.model_path.display(),
                m.accuracy,
                m.auc,
                if m.auc_degenerate { " [single-class eval]" } else { "" },
                m.log_loss,
                m.train_rows,
                m.eval_rows,
            );
        }
        Commands::Models => {
            let sidecars = list_models(config)?;
            if sidecars.is_empty() {
                info!("no published models");
            }
            for sidecar in sidecars {
                println!(
                    "{}\t{}\t{}\taccuracy={:.4}\tauc={:.4}{}",
                    sidecar.version,
                    sidecar.trained_at.to_rfc3339(),
                    sidecar.feature_contract_version,
                    sidecar.metrics.accuracy,
                    sidecar.metrics.auc,
                    if sidecar.metrics.auc_degenerate { " (degenerate)" } else { "" },
                );
            }
        }
    }
    Ok(())
}

fn describe_failure(err: &PipelineError, config: &PipelineConfig) -> String {
    match err {
        PipelineError::Persistence(PersistenceError::NotFound { path })
            if path == &config.dataset_path =>
        {
            format!(
                "dataset snapshot not found at {}; run `ml-offline extract` first",
                path.display()
            )
        }
        other => other.to_string(),
    }
}

fn init_logging(config: &PipelineConfig, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { config.log.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid log level '{default_level}': {e}"))?;

    match config.log.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
    }

    Ok(())
}
