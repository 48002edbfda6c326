//! Extracts image features for one run mode.
//!
//! `extract_features TRAIN` walks the training image tree, appends one
//! feature row per file to the training store and rewrites the training class
//! ranges. The store must exist already (see `feature_store init`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ingestion_extraction::ExtractionReport;
use pipeline_config::{PipelineConfig, RunMode, DEFAULT_CONFIG_PATH};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Extract image features into a feature store")]
struct Args {
    /// Run mode, TRAIN or VALID.
    mode: String,

    /// Pipeline configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `training.extraction_batch` for this run.
    #[arg(long)]
    batch: Option<usize>,
}

fn run(args: Args) -> Result<()> {
    let mode: RunMode = args.mode.parse()?;
    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(batch) = args.batch {
        config.training.extraction_batch = batch;
        config.validate()?;
    }
    let run = config.run_settings(mode);
    run.check_paths()
        .with_context(|| format!("{mode} inputs are not ready"))?;

    let report = extract(&config, mode)?;
    info!(?report, "done");
    println!(
        "{mode}: {} files in {} chunks, {} rows stored, {} classes",
        report.files, report.chunks, report.rows_after, report.classes
    );
    Ok(())
}

#[cfg(feature = "onnx")]
fn extract(config: &PipelineConfig, mode: RunMode) -> Result<ExtractionReport> {
    use ingestion_extraction::{ExtractionDriver, OnnxExtractor};

    let extractor = OnnxExtractor::from_settings(&config.model, config.training.image_dim)
        .with_context(|| format!("loading {}", config.model.weights_path.display()))?;
    let report = ExtractionDriver::new(config, mode, extractor)?.run()?;
    Ok(report)
}

/// Builds made with `--no-default-features` carry no network runtime.
#[cfg(not(feature = "onnx"))]
fn extract(config: &PipelineConfig, mode: RunMode) -> Result<ExtractionReport> {
    anyhow::bail!(
        "cannot run {mode} extraction with {}: built without the `onnx` feature",
        config.model.weights_path.display()
    )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
