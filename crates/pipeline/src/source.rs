//! Shared row iteration for all modes.

use std::path::Path;

use relink_core::ledger::LedgerError;

/// Errors that abort a run.  Per-row failures never surface here; they
/// land in the failure ledger instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input list could not be opened or read.
    #[error("failed to read input CSV: {0}")]
    Input(#[from] csv::Error),

    /// A ledger write failed; the run stops rather than dropping
    /// outcomes silently.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows that produced a ledger entry.
    pub processed: u64,
    /// Rows recorded in the success ledger.
    pub succeeded: u64,
    /// Rows recorded in the failure ledger.
    pub failed: u64,
    /// Rows skipped with a warning (unparsable, header, blank).
    pub skipped: u64,
}

/// Open the input list for row-at-a-time reading.
///
/// No header semantics at the CSV level; an optional header line is
/// detected per-row by the parsers in `relink_core::rows`.  Records
/// are trimmed and may vary in width.
pub(crate) fn open_input(path: &Path) -> Result<csv::Reader<std::fs::File>, PipelineError> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}
