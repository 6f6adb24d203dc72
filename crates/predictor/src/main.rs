//! Compression parameter predictor
//!
//! Invoked once per data block by the compression engine: reads a statistics
//! record, runs the configured model and prints one JSON array of parameters
//! on stdout. Diagnostics go to stderr.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{encode, predict};
use config::{LogFormat, PredictorConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compression parameter predictor
#[derive(Parser)]
#[command(name = "param-predictor")]
#[command(author, version, about = "Predicts compression pipeline parameters from time-series statistics", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, JSON or YAML by extension)
    #[arg(long, global = true, env = "PARAM_PREDICTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict parameters for a statistics record or a feature table
    Predict(predict::PredictArgs),

    /// Print the feature vector of a statistics record as a CSV row
    Encode(encode::EncodeArgs),
}

fn init_tracing(format: LogFormat, level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries only the emitted parameters
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PredictorConfig::load(cli.config.as_deref())?;
    init_tracing(
        cli.log_format.unwrap_or(config.log_format),
        &config.log_level,
        cli.verbose,
    );

    match cli.command {
        Commands::Predict(args) => predict::run(&args, &config),
        Commands::Encode(args) => encode::run(&args),
    }
}
