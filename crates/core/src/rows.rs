//! CSV row parsing for the input list.
//!
//! Rows are read with no fixed header; an optional header line in row 1
//! is detected case-insensitively and skipped.  Rows with missing or
//! blank required columns are rejected with a [`RowError`] so the caller
//! can warn and move on — such rows never reach a ledger.

use csv::StringRecord;

/// Column names recognized (case-insensitively) as a header cell.
const HEADER_CELLS: &[&str] = &["entry_id", "asset_id", "id"];

/// One row of the default replacement mode: an entry and the asset it
/// currently links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceRow {
    pub entry_id: String,
    pub asset_id: String,
}

/// A row that cannot be used.  Callers warn and skip; no ledger entry
/// is produced for these.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    /// The record has fewer columns than the mode requires.
    #[error("row {row}: missing required column `{column}`")]
    MissingColumn { row: u64, column: &'static str },

    /// A required column is present but empty after trimming.
    #[error("row {row}: blank required column `{column}`")]
    BlankColumn { row: u64, column: &'static str },
}

/// Parse a replacement-mode row (`entry_id, asset_id`).
///
/// Returns `Ok(None)` when row 1 turns out to be a header line.
pub fn parse_replace_row(record: &StringRecord, row: u64) -> Result<Option<ReplaceRow>, RowError> {
    let entry_id = required(record, row, 0, "entry_id")?;
    if row == 1 && is_header_cell(&entry_id) {
        return Ok(None);
    }
    let asset_id = required(record, row, 1, "asset_id")?;
    Ok(Some(ReplaceRow { entry_id, asset_id }))
}

/// Parse a single-id row for the secondary modes.
///
/// `column` is the name reported in errors (`entry_id` or `asset_id`).
/// Returns `Ok(None)` when row 1 turns out to be a header line.
pub fn parse_id_row(
    record: &StringRecord,
    row: u64,
    column: &'static str,
) -> Result<Option<String>, RowError> {
    let id = required(record, row, 0, column)?;
    if row == 1 && is_header_cell(&id) {
        return Ok(None);
    }
    Ok(Some(id))
}

/// Whether a cell value looks like a column name rather than an id.
fn is_header_cell(cell: &str) -> bool {
    HEADER_CELLS.iter().any(|h| cell.eq_ignore_ascii_case(h))
}

/// Fetch and trim column `index`, rejecting missing or blank values.
fn required(
    record: &StringRecord,
    row: u64,
    index: usize,
    column: &'static str,
) -> Result<String, RowError> {
    let value = record
        .get(index)
        .ok_or(RowError::MissingColumn { row, column })?
        .trim();
    if value.is_empty() {
        return Err(RowError::BlankColumn { row, column });
    }
    Ok(value.to_string())
}
