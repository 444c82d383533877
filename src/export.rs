//! Export Module
//!
//! Writes the analysis results to the output directory: one chart per
//! eligible identifier, the category reports, the reference audit list and
//! an optional JSON summary for integration with other tooling.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzer::{AnalysisReport, CycleStatistics, CycleTimeSeries};
use crate::error::ReportError;
use crate::identifier::{format_hex, mask_standard_id};
use crate::plot::CyclePlotter;
use crate::reference::GroupIdentifierSet;

pub const CATEGORY_A_FILE: &str = "category_A.txt";
pub const CATEGORY_B_FILE: &str = "category_B.txt";
pub const BLOCKED_IDS_FILE: &str = "blocked_IDs.txt";
pub const SUMMARY_FILE: &str = "summary.json";

/// What the writer produces besides the text reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub plots: bool,
    pub summary_json: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            plots: true,
            summary_json: false,
        }
    }
}

/// Files and counts produced by one emission.
#[derive(Debug, Clone, Default)]
pub struct EmitSummary {
    pub plots_written: usize,
    pub files: Vec<PathBuf>,
}

/// `category_A.txt` body: `<hex-id>: <exceedances>` per flagged identifier.
pub fn category_a_text(report: &AnalysisReport) -> String {
    report
        .flagged()
        .filter(|(id, _)| *id < report.max_standard_id)
        .map(|(id, count)| format!("{}: {}\n", format_hex(id), count))
        .collect()
}

/// `category_B.txt` body: `<hex-id>` per clean identifier.
pub fn category_b_text(report: &AnalysisReport) -> String {
    report
        .clean()
        .filter(|id| *id < report.max_standard_id)
        .map(|id| format!("{}\n", format_hex(id)))
        .collect()
}

/// `blocked_IDs.txt` body: the reference set as a bracketed list of quoted
/// hex strings, e.g. `['0xf004', '0xfef1']`.
pub fn blocked_ids_text(reference: &GroupIdentifierSet) -> String {
    let items: Vec<String> = reference
        .iter()
        .map(|id| format!("'{}'", format_hex(id)))
        .collect();
    format!("[{}]", items.join(", "))
}

/// Operator-facing summary lines.
pub fn summary_lines(report: &AnalysisReport) -> Vec<String> {
    vec![
        format!("Number of members in Category A: {}", report.flagged_count()),
        format!("Number of members in Category B: {}", report.clean_count()),
        format!("Number of extracted PGNs: {}", report.reference.len()),
    ]
}

/// JSON-serializable analysis summary
#[derive(Serialize)]
pub struct JsonSummary {
    pub version: &'static str,
    pub generated_at: String,
    pub threshold_percent: f64,
    pub records_analyzed: usize,
    pub observed_ids: usize,
    pub excluded_out_of_range: usize,
    pub excluded_reference: usize,
    pub category_a: usize,
    pub category_b: usize,
    pub reference_size: usize,
    pub identifiers: Vec<JsonIdentifier>,
}

impl From<&AnalysisReport> for JsonSummary {
    fn from(report: &AnalysisReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now().to_rfc3339(),
            threshold_percent: report.threshold_percent,
            records_analyzed: report.records_analyzed,
            observed_ids: report.observed_ids,
            excluded_out_of_range: report.excluded_out_of_range,
            excluded_reference: report.excluded_reference,
            category_a: report.flagged_count(),
            category_b: report.clean_count(),
            reference_size: report.reference.len(),
            identifiers: report
                .series
                .iter()
                .map(|series| JsonIdentifier::new(series, report))
                .collect(),
        }
    }
}

/// JSON-serializable per-identifier result
#[derive(Serialize)]
pub struct JsonIdentifier {
    pub id: String,
    pub raw_id: u32,
    pub group_id: String,
    pub pdu_format: String,
    pub occurrences: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JsonStatistics>,
}

impl JsonIdentifier {
    fn new(series: &CycleTimeSeries, report: &AnalysisReport) -> Self {
        let decoded = series.decoded();
        let key = mask_standard_id(series.raw_id);
        Self {
            id: decoded.to_string(),
            raw_id: series.raw_id,
            group_id: format_hex(decoded.group_id as u32),
            pdu_format: decoded.pdu_format.to_string(),
            occurrences: series.timestamps.len(),
            category: report.outcomes.get(&key).map(|o| o.category()),
            statistics: report.statistics.get(&key).map(JsonStatistics::from),
        }
    }
}

/// JSON-serializable cycle time statistics
#[derive(Serialize)]
pub struct JsonStatistics {
    pub samples: usize,
    pub median_ms: f64,
    pub threshold_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub exceedances: usize,
}

impl From<&CycleStatistics> for JsonStatistics {
    fn from(stats: &CycleStatistics) -> Self {
        Self {
            samples: stats.samples,
            median_ms: stats.median,
            threshold_ms: stats.threshold,
            mean_ms: stats.mean,
            min_ms: stats.min,
            max_ms: stats.max,
            exceedances: stats.exceedances,
        }
    }
}

/// Exports the summary as pretty-printed JSON
pub fn export_json(report: &AnalysisReport) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(&JsonSummary::from(report))?)
}

/// Writes every artifact of an analysis into one directory.
pub struct ReportWriter {
    output_dir: PathBuf,
    options: ReportOptions,
}

impl ReportWriter {
    pub fn new(output_dir: &Path, options: ReportOptions) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            options,
        }
    }

    pub fn emit(
        &self,
        report: &AnalysisReport,
        plotter: &dyn CyclePlotter,
    ) -> Result<EmitSummary, ReportError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ReportError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        let mut summary = EmitSummary::default();

        if self.options.plots {
            for series in &report.series {
                let path = self.output_dir.join(plotter.file_name(series.raw_id));
                plotter.plot(series, &path)?;
                debug!(id = %format_hex(series.raw_id), path = %path.display(), "Plot written");
                summary.plots_written += 1;
                summary.files.push(path);
            }
        }

        summary
            .files
            .push(self.write_file(CATEGORY_A_FILE, &category_a_text(report))?);
        summary
            .files
            .push(self.write_file(CATEGORY_B_FILE, &category_b_text(report))?);
        summary
            .files
            .push(self.write_file(BLOCKED_IDS_FILE, &blocked_ids_text(&report.reference))?);

        if self.options.summary_json {
            let json = export_json(report)?;
            summary.files.push(self.write_file(SUMMARY_FILE, &json)?);
        }

        info!(
            dir = %self.output_dir.display(),
            plots = summary.plots_written,
            files = summary.files.len(),
            "Reports written"
        );
        Ok(summary)
    }

    fn write_file(&self, name: &str, contents: &str) -> Result<PathBuf, ReportError> {
        let path = self.output_dir.join(name);
        fs::write(&path, contents).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
