// ==============================================================================
// main.rs - Identity Vigilance Entry Point
// ==============================================================================
// Description: Command-line QC run over one GeneMapper batch export
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_vigilance::config::VigilanceConfig;
use identity_vigilance::output::{OutputFormat, OutputGenerator};
use identity_vigilance::parsers::FormatError;
use identity_vigilance::processor::{ReportInfo, VigilanceProcessor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeneMapper export (.txt, .tsv, optionally gzip-compressed)
    input: PathBuf,

    /// Directory for report files
    #[arg(short, long, env = "IDENTITY_VIGILANCE_OUTPUT_DIR", default_value = "reports")]
    output_dir: PathBuf,

    /// Report formats (json, tsv, sqlite); repeat for several
    #[arg(short, long = "format", default_value = "json")]
    formats: Vec<OutputFormat>,

    /// JSON configuration file (column names, keywords, matrix budget)
    #[arg(short, long, env = "IDENTITY_VIGILANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Wall-clock limit for the similarity matrix, in seconds
    #[arg(long)]
    max_matrix_secs: Option<u64>,

    /// Maximum number of sample pairs in the similarity matrix
    #[arg(long)]
    max_matrix_pairs: Option<usize>,

    /// Worker threads for the similarity matrix
    #[arg(long)]
    threads: Option<usize>,

    /// Person interpreting the batch
    #[arg(long)]
    interpreter: Option<String>,

    /// Week of the run
    #[arg(long)]
    week: Option<String>,

    /// Series identifier
    #[arg(long)]
    series: Option<String>,

    /// Free-text comment for the report
    #[arg(long)]
    comment: Option<String>,

    /// Exit with a non-zero status when the batch fails QC
    #[arg(long)]
    fail_on_errors: bool,
}

fn load_config(args: &Args) -> Result<VigilanceConfig> {
    let mut config = match &args.config {
        Some(path) => VigilanceConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => VigilanceConfig::default(),
    };

    if let Some(secs) = args.max_matrix_secs {
        config.similarity.max_duration_secs = Some(secs);
    }
    if let Some(pairs) = args.max_matrix_pairs {
        config.similarity.max_pairs = Some(pairs);
    }
    if let Some(threads) = args.threads {
        config.similarity.threads = Some(threads);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;

    let info = ReportInfo {
        interpreter: args.interpreter.clone(),
        week: args.week.clone(),
        series: args.series.clone(),
        comment: args.comment.clone(),
    };
    let processor = VigilanceProcessor::new(config).with_report_info(info);

    let report = processor.process(&args.input)?;

    if !report.negative_control_clean {
        warn!("Batch cannot be certified: negative controls missing or not clean");
    }

    let written = OutputGenerator::new(args.output_dir.clone())
        .generate(&args.formats, &report)
        .context("Failed to write report")?;

    for (format, paths) in &written {
        for path in paths {
            info!("Wrote {} report: {:?}", format, path);
        }
    }

    Ok(report.passed())
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_vigilance=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let fail_on_errors = args.fail_on_errors;

    info!("Identity vigilance starting...");

    match run(args) {
        Ok(passed) => {
            if passed {
                info!("Batch passed identity vigilance");
                ExitCode::SUCCESS
            } else if fail_on_errors {
                error!("Batch failed identity vigilance");
                ExitCode::from(1)
            } else {
                warn!("Batch failed identity vigilance");
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            if let Some(format_error) = e.downcast_ref::<FormatError>() {
                error!("Input format error: {}", format_error);
            } else {
                error!("Processing failed: {:#}", e);
            }
            ExitCode::from(2)
        }
    }
}
