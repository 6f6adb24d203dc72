//! `predict` subcommand

use crate::config::PredictorConfig;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use predictor_lib::{
    create_predictor, ArtifactLocator, ArtifactOverrides, BackendKind, InferenceEntrypoint,
    InferenceInput, InputKind, ParameterSet, StructuredLogger,
};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How to read the `--features` file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum KindArg {
    /// `.json` is a statistics record, anything else a table
    #[default]
    Auto,
    Statistics,
    Table,
}

impl KindArg {
    fn resolve(self, path: &Path) -> InputKind {
        match self {
            KindArg::Auto => InputKind::from_extension(path),
            KindArg::Statistics => InputKind::Statistics,
            KindArg::Table => InputKind::Table,
        }
    }
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    /// Statistics JSON or headerless CSV of encoded features
    #[arg(long, short = 'f')]
    pub features: PathBuf,

    #[arg(long, value_enum, default_value_t = KindArg::Auto)]
    pub kind: KindArg,

    /// forest, boosted, network or onnx
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// full or legacy
    #[arg(long)]
    pub parameter_set: Option<ParameterSet>,

    /// Directory holding the model artifacts
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Model file; repeat once per parameter for the boosted backend
    #[arg(long = "model")]
    pub models: Vec<PathBuf>,

    /// Scaler file for the network backends
    #[arg(long)]
    pub scaler: Option<PathBuf>,

    /// Also write every row's parameters to this CSV file
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Settings after flags are layered over the loaded configuration
struct Resolved {
    backend: BackendKind,
    parameter_set: ParameterSet,
    locator: ArtifactLocator,
}

fn resolve(args: &PredictArgs, config: &PredictorConfig) -> Result<Resolved> {
    let model_dir = args.model_dir.as_ref().or(config.model_dir.as_ref());
    let locator = match model_dir {
        Some(dir) => ArtifactLocator::new(dir),
        None => ArtifactLocator::installed().context("Failed to locate model directory")?,
    };
    Ok(Resolved {
        backend: args.backend.unwrap_or(config.backend),
        parameter_set: args.parameter_set.unwrap_or(config.parameter_set),
        locator: locator.with_overrides(ArtifactOverrides {
            models: args.models.clone(),
            scaler: args.scaler.clone(),
        }),
    })
}

fn write_rows(path: &Path, emission: &predictor_lib::Emission) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    emission
        .write_csv(file)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Load artifacts, run one inference and print the parameter line
pub fn run(args: &PredictArgs, config: &PredictorConfig) -> Result<()> {
    let settings = resolve(args, config)?;
    let logger = StructuredLogger::new(settings.backend.as_str());
    logger.log_startup(
        VERSION,
        &settings.parameter_set.to_string(),
        &settings.locator.dir().display().to_string(),
    );

    let start = Instant::now();
    let predictor = create_predictor(settings.backend, settings.parameter_set, &settings.locator)
        .with_context(|| format!("Failed to load {} backend", settings.backend))?;
    logger.log_artifacts_loaded(
        predictor.input_dim(),
        predictor.output_dim(),
        start.elapsed().as_millis(),
    );

    let entrypoint = InferenceEntrypoint::new(predictor.as_ref(), settings.parameter_set)
        .context("Model does not match the parameter set")?;
    let input = InferenceInput::from_path(args.kind.resolve(&args.features), &args.features);
    let emission = entrypoint.run(&input);

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", emission.line()).context("Failed to write to stdout")?;
    handle.flush().context("Failed to write to stdout")?;

    // the parameter line is already out; a CSV failure does not change it
    if let Some(out) = &args.out {
        if let Err(err) = write_rows(out, &emission) {
            let reason = format!("{err:#}");
            warn!(event = "csv_write_failed", error = %reason, "Could not write CSV output");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> PredictArgs {
        PredictArgs {
            features: PathBuf::from("stats.json"),
            kind: KindArg::Auto,
            backend: None,
            parameter_set: None,
            model_dir: None,
            models: Vec::new(),
            scaler: None,
            out: None,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let config = PredictorConfig {
            backend: BackendKind::Network,
            parameter_set: ParameterSet::Legacy,
            model_dir: Some(PathBuf::from("/from/config")),
            ..PredictorConfig::default()
        };
        let mut args = args();
        args.backend = Some(BackendKind::Forest);
        args.model_dir = Some(PathBuf::from("/from/flag"));

        let resolved = resolve(&args, &config).unwrap();
        assert_eq!(resolved.backend, BackendKind::Forest);
        assert_eq!(resolved.parameter_set, ParameterSet::Legacy);
        assert_eq!(resolved.locator.dir(), Path::new("/from/flag"));
    }

    #[test]
    fn test_kind_resolution() {
        assert_eq!(
            KindArg::Auto.resolve(Path::new("block.json")),
            InputKind::Statistics
        );
        assert_eq!(KindArg::Auto.resolve(Path::new("rows.csv")), InputKind::Table);
        assert_eq!(
            KindArg::Statistics.resolve(Path::new("rows.csv")),
            InputKind::Statistics
        );
    }
}
