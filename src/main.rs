//! CLI entry point for the outage forecaster.
//!
//! Provides subcommands for training per-city outage models, writing the
//! labeled datasets alone, producing rule-based risk tables and printing the
//! effective configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use outage_forecast::config::PipelineConfig;
use outage_forecast::output::print_json;
use outage_forecast::pipeline::{
    BatchSummary, run_labeling, run_risk, run_risk_training, run_training,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "outage_forecast")]
#[command(about = "Forecast weather-driven power outages per city", long_about = None)]
struct Cli {
    /// JSON config file; built-in defaults apply when omitted
    #[arg(short, long, env = "OUTAGE_FORECAST_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Directory for datasets, reports and the batch summary
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    /// Years to load, comma separated (e.g. 2020,2021)
    #[arg(long, value_delimiter = ',', global = true)]
    years: Vec<i32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label, train and report every configured city
    Train {
        /// Worker threads for model fitting (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Seed for the split and the forests
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write the labeled hourly dataset of every city without training
    Label,
    /// Write rule-based rain, wind and vegetation risk tables
    Risk,
    /// Train the rain-risk classifier on the tables written by `risk`
    RiskTrain {
        /// Worker threads for model fitting (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Seed for the split and the forest
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/outage_forecast.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("outage_forecast.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("RUST_LOG")
                .from_env_lossy(),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .with_env_var("RUST_LOG_JSON")
                .from_env_lossy(),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if !cli.years.is_empty() {
        config.years = cli.years.clone();
    }
    Ok(config)
}

fn apply_training_overrides(config: &mut PipelineConfig, threads: Option<usize>, seed: Option<u64>) {
    if let Some(threads) = threads {
        config.training.threads = threads;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }
}

fn log_summary(summary: &BatchSummary) {
    for city in &summary.cities {
        if city.status.is_success() {
            info!(city = %city.city, status = ?city.status, stage = ?city.stage, "City done");
        } else {
            warn!(
                city = %city.city,
                status = ?city.status,
                stage = ?city.stage,
                error = city.error.as_deref().unwrap_or(""),
                "City aborted"
            );
        }
    }
    info!(
        success = summary.success,
        failure = summary.failure,
        "Batch summary"
    );
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_logging();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Train { threads, seed } => {
            apply_training_overrides(&mut config, threads, seed);
            let summary = run_training(&config)?;
            log_summary(&summary);
        }
        Commands::Label => {
            let summary = run_labeling(&config)?;
            log_summary(&summary);
        }
        Commands::Risk => {
            let summary = run_risk(&config)?;
            log_summary(&summary);
        }
        Commands::RiskTrain { threads, seed } => {
            apply_training_overrides(&mut config, threads, seed);
            let summary = run_risk_training(&config)?;
            log_summary(&summary);
        }
        Commands::ShowConfig => {
            print_json(&config)?;
        }
    }

    Ok(())
}
