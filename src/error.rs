//! Domain-specific error types for can-cycle-scan.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning input documents into records.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is not a readable archive: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive '{path}' has no member '{member}'")]
    MissingMember { path: PathBuf, member: String },

    #[error("Failed to read '{member}' from '{path}': {source}")]
    MemberRead {
        path: PathBuf,
        member: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML document at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Row {row}: cannot parse '{text}': {reason}")]
    Format {
        row: usize,
        text: String,
        reason: String,
    },
}

impl LoadError {
    pub fn format(row: usize, text: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            row,
            text: text.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while writing reports and plots.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render plot '{path}': {reason}")]
    Plot { path: PathBuf, reason: String },

    #[error("Failed to serialize summary: {0}")]
    Summary(#[from] serde_json::Error),
}
