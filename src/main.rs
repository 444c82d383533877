//! can-cycle-scan: finds CAN identifiers with irregular transmission cadence.
//!
//! A capture of bus traffic (timestamp + identifier per frame) is grouped by
//! identifier, and each identifier's cycle times are compared against a
//! threshold derived from their median.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Reference  │──┐
//! │   (.ods)    │  │   ┌─────────────┐     ┌─────────────┐
//! └─────────────┘  ├──>│ Classifier  │────>│   Export    │
//! ┌─────────────┐  │   │  (median)   │     │ (txt, svg)  │
//! │   Capture   │──┘   └─────────────┘     └─────────────┘
//! │   (.ods)    │
//! └─────────────┘
//! ```
//!
//! - **Reference**: group identifiers that are known traffic and never flagged
//! - **Capture**: frames in rows 26.. of the capture spreadsheet
//! - **Classifier**: category A (irregular) or B (regular) per identifier
//! - **Export**: category reports, reference audit list, one chart per identifier

mod analyzer;
mod capture;
mod config;
mod error;
mod export;
mod identifier;
mod ingest;
mod plot;
mod reference;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::analyzer::{AnalysisReport, CycleClassifier};
use crate::capture::{load_capture, CaptureWindow};
use crate::config::Config;
use crate::export::{summary_lines, ReportWriter};
use crate::reference::load_reference;

/// Detect CAN identifiers whose cycle time occasionally exceeds its median.
#[derive(Parser, Debug)]
#[command(name = "can-cycle-scan")]
#[command(version)]
#[command(about = "Classify CAN identifiers by cycle-time regularity")]
#[command(long_about = None)]
struct Cli {
    /// Capture spreadsheet (.ods) with one frame per row.
    capture: PathBuf,

    /// Reference spreadsheet (.ods) with one hex group identifier per row.
    reference: PathBuf,

    /// Directory receiving reports and charts.
    output_dir: PathBuf,

    /// Number of capture rows to analyze after the header rows.
    num_rows: usize,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tolerance above the median cycle time, in percent.
    #[arg(short = 'p', long)]
    threshold_percent: Option<f64>,

    /// Skip chart rendering.
    #[arg(long)]
    no_plots: bool,

    /// Also write summary.json.
    #[arg(long)]
    summary_json: bool,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = parse_cli();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = resolve_config(&cli)?;
    let report = run(&cli, &config)?;

    for line in summary_lines(&report) {
        println!("{}", line);
    }
    Ok(())
}

/// Parses arguments; usage errors exit with status 1.
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Loads the config file and applies CLI overrides.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let Some(percent) = cli.threshold_percent {
        config.classifier.threshold_percent = percent;
    }
    if cli.no_plots {
        config.output.plots = false;
    }
    if cli.summary_json {
        config.output.summary_json = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run(cli: &Cli, config: &Config) -> Result<AnalysisReport> {
    info!("Starting cycle-time analysis...");

    let document = &config.capture.document;
    let reference = load_reference(&cli.reference, document).with_context(|| {
        format!("Failed to load reference file {}", cli.reference.display())
    })?;

    let window = CaptureWindow::new(config.capture.header_rows, cli.num_rows);
    let records = load_capture(&cli.capture, document, window)
        .with_context(|| format!("Failed to load capture file {}", cli.capture.display()))?;

    let report = CycleClassifier::new(config.classifier_config()).classify(&records, &reference);

    ReportWriter::new(&cli.output_dir, config.report_options())
        .emit(&report, &config.plotter())
        .context("Failed to write reports")?;

    info!("Analysis complete");
    Ok(report)
}
