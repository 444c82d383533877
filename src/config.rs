//! Configuration Module
//!
//! Provides TOML-based configuration for can-cycle-scan.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyzer::{ClassifierConfig, DEFAULT_THRESHOLD_PERCENT, STANDARD_ID_LIMIT};
use crate::export::ReportOptions;
use crate::identifier::EXTENDED_ID_LIMIT;
use crate::ingest::DEFAULT_DOCUMENT;
use crate::plot::SvgPlotter;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureSettings,
    pub classifier: ClassifierSettings,
    pub output: OutputSettings,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads configuration from file if given, otherwise returns defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capture.document.trim().is_empty() {
            anyhow::bail!("capture.document must not be empty");
        }
        let percent = self.classifier.threshold_percent;
        if !percent.is_finite() || percent < 0.0 {
            anyhow::bail!("threshold_percent must be a finite, non-negative number");
        }
        if self.classifier.max_standard_id == 0 {
            anyhow::bail!("max_standard_id must be greater than 0");
        }
        if self.classifier.max_standard_id > EXTENDED_ID_LIMIT {
            anyhow::bail!(
                "max_standard_id must not exceed {:#x} (29-bit identifier range)",
                EXTENDED_ID_LIMIT
            );
        }
        if self.output.plot_width == 0 || self.output.plot_height == 0 {
            anyhow::bail!("plot dimensions must be greater than 0");
        }
        Ok(())
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            threshold_percent: self.classifier.threshold_percent,
            max_standard_id: self.classifier.max_standard_id,
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            plots: self.output.plots,
            summary_json: self.output.summary_json,
        }
    }

    pub fn plotter(&self) -> SvgPlotter {
        SvgPlotter {
            width: self.output.plot_width,
            height: self.output.plot_height,
        }
    }
}

/// Capture document layout
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Metadata rows at the top of the capture that are never analyzed
    pub header_rows: usize,
    /// Archive member holding the spreadsheet table
    pub document: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            header_rows: 25,
            document: DEFAULT_DOCUMENT.to_string(),
        }
    }
}

/// Classification thresholds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Tolerance above the median cycle time, in percent
    pub threshold_percent: f64,
    /// Exclusive upper bound for analyzed identifiers
    pub max_standard_id: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            max_standard_id: STANDARD_ID_LIMIT,
        }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Render one chart per identifier
    pub plots: bool,
    /// Also write summary.json
    pub summary_json: bool,
    pub plot_width: u32,
    pub plot_height: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        let plotter = SvgPlotter::default();
        Self {
            plots: true,
            summary_json: false,
            plot_width: plotter.width,
            plot_height: plotter.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capture.header_rows, 25);
        assert_eq!(config.capture.document, "content.xml");
        assert_eq!(config.classifier.threshold_percent, 5.0);
        assert_eq!(config.classifier.max_standard_id, 0x800);
        assert!(config.output.plots);
        assert!(!config.output.summary_json);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.classifier.threshold_percent = -1.0;
        assert!(config.validate().is_err());

        config.classifier.threshold_percent = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.max_standard_id = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.max_standard_id = EXTENDED_ID_LIMIT;
        assert!(config.validate().is_ok());
        config.classifier.max_standard_id = EXTENDED_ID_LIMIT + 1;
        assert!(config.validate().is_err());
        config.classifier.max_standard_id = u32::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.plot_width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.document = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_roundtrip() {
        let config_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(config_str.contains("[capture]"));
        assert!(config_str.contains("[classifier]"));
        assert!(config_str.contains("[output]"));

        let parsed: Config = toml::from_str(&config_str).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[capture]
header_rows = 10

[classifier]
threshold_percent = 12.5

[output]
plots = false
summary_json = true
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.header_rows, 10);
        assert_eq!(config.capture.document, "content.xml");
        assert_eq!(config.classifier.threshold_percent, 12.5);
        assert_eq!(config.classifier.max_standard_id, 0x800);
        assert!(!config.output.plots);
        assert!(config.report_options().summary_json);
        assert_eq!(config.classifier_config().threshold_percent, 12.5);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(Config::load(Path::new("/nonexistent/can-cycle-scan.toml")).is_err());
        assert_eq!(Config::load_or_default(None).unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\nplot_width = 800\n").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(config.plotter().width, 800);
        assert_eq!(config.plotter().height, 500);
    }
}
