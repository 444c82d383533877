//! Capture loading.
//!
//! A capture spreadsheet holds one logged frame per row, exported as a single
//! `;`-separated cell. Only the timestamp and identifier columns are used.
//!
//! ```text
//! 0     ;1          ;2   ;3  ;4  ;5       ;...
//! index ;time (ms)  ;... ;...;...;id (hex);payload...
//! ```

use std::path::Path;

use tracing::{debug, info, trace, warn};

use crate::error::LoadError;
use crate::ingest::{load_rows, TableRow};

const FIELD_DELIMITER: char = ';';
const TIMESTAMP_FIELD: usize = 1;
const IDENTIFIER_FIELD: usize = 5;

/// A single frame observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRecord {
    pub timestamp_ms: f64,
    /// Extended identifier as logged; only the low 29 bits are meaningful.
    pub raw_id: u32,
}

/// Rows of the capture that are analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureWindow {
    /// Leading metadata rows that are always skipped.
    pub header_rows: usize,
    /// Number of rows read after the header.
    pub num_rows: usize,
}

impl CaptureWindow {
    pub fn new(header_rows: usize, num_rows: usize) -> Self {
        Self {
            header_rows,
            num_rows,
        }
    }

    /// Whether a 1-based row position falls inside the window.
    pub fn contains(&self, position: usize) -> bool {
        position > self.header_rows && position <= self.header_rows.saturating_add(self.num_rows)
    }
}

/// Loads the capture records inside `window` from the spreadsheet at `path`.
pub fn load_capture(
    path: &Path,
    member: &str,
    window: CaptureWindow,
) -> Result<Vec<CaptureRecord>, LoadError> {
    info!(path = %path.display(), header_rows = window.header_rows, num_rows = window.num_rows, "Loading capture");

    let rows = load_rows(path, member)?;
    let records = records_from_rows(&rows, window)?;

    if records.is_empty() {
        warn!(path = %path.display(), "Capture window contains no frames");
    } else {
        info!(records = records.len(), "Capture loaded");
    }
    Ok(records)
}

/// Converts table rows into records, keeping capture order.
///
/// Rows without a paragraph are skipped; any malformed cell aborts the load.
pub fn records_from_rows(
    rows: &[TableRow],
    window: CaptureWindow,
) -> Result<Vec<CaptureRecord>, LoadError> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in rows.iter().filter(|r| window.contains(r.position)) {
        let Some(text) = row.first_text.as_deref() else {
            skipped += 1;
            continue;
        };
        let record = parse_record(row.position, text)?;
        trace!(row = row.position, timestamp_ms = record.timestamp_ms, raw_id = record.raw_id, "Frame");
        records.push(record);
    }

    debug!(records = records.len(), skipped, "Capture rows converted");
    Ok(records)
}

/// Parses one `;`-separated frame line.
pub fn parse_record(row: usize, text: &str) -> Result<CaptureRecord, LoadError> {
    let fields: Vec<&str> = text.split(FIELD_DELIMITER).collect();
    if fields.len() <= IDENTIFIER_FIELD {
        return Err(LoadError::format(
            row,
            text,
            format!(
                "expected at least {} fields, found {}",
                IDENTIFIER_FIELD + 1,
                fields.len()
            ),
        ));
    }

    let timestamp_ms = parse_timestamp(fields[TIMESTAMP_FIELD])
        .map_err(|reason| LoadError::format(row, text, reason))?;
    let raw_id =
        parse_hex_u32(fields[IDENTIFIER_FIELD]).map_err(|reason| LoadError::format(row, text, reason))?;

    Ok(CaptureRecord {
        timestamp_ms,
        raw_id,
    })
}

fn parse_timestamp(field: &str) -> Result<f64, String> {
    let value: f64 = field
        .trim()
        .parse()
        .map_err(|_| format!("invalid timestamp '{}'", field))?;
    if !value.is_finite() {
        return Err(format!("non-finite timestamp '{}'", field));
    }
    Ok(value)
}

/// Parses a hexadecimal integer with an optional `0x` prefix.
pub fn parse_hex_u32(field: &str) -> Result<u32, String> {
    let trimmed = field.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid hexadecimal value '{}'", field));
    }
    u32::from_str_radix(digits, 16).map_err(|e| format!("hexadecimal value '{}' out of range: {}", field, e))
}
