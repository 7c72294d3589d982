//! Append-only outcome ledgers.
//!
//! Each run appends to two CSV ledgers: one for rows whose replacement
//! completed and validated, one for rows that failed at some pipeline
//! stage.  The header is written only when the file is empty at open,
//! so reruns append below earlier results.  Every record is flushed as
//! soon as it is written — a killed run keeps all completed rows.

use std::fs::{File, OpenOptions};
use std::path::Path;

/// Column header of the success ledger.
pub const SUCCESS_HEADER: [&str; 3] = ["entry_id", "old_asset_id", "new_asset_id"];

/// Column header of the failure ledger.
pub const FAILURE_HEADER: [&str; 4] = ["entry_id", "old_asset_id", "new_asset_id", "error"];

/// Errors opening or writing a ledger file.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// A single append-only CSV ledger.
pub struct Ledger {
    writer: csv::Writer<File>,
}

impl Ledger {
    /// Open (or create) the ledger at `path` in append mode, writing
    /// `header` iff the file is currently empty.
    pub fn open(path: &Path, header: &[&str]) -> Result<Self, LedgerError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }

    /// Append one record and flush it to disk.
    pub fn record(&mut self, fields: &[&str]) -> Result<(), LedgerError> {
        self.writer.write_record(fields)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// The success/failure ledger pair shared by every mode.
pub struct Ledgers {
    success: Ledger,
    failure: Ledger,
}

impl Ledgers {
    /// Open both ledgers.  Failing to open either aborts the run
    /// before any row is processed.
    pub fn open(success_path: &Path, failure_path: &Path) -> Result<Self, LedgerError> {
        Ok(Self {
            success: Ledger::open(success_path, &SUCCESS_HEADER)?,
            failure: Ledger::open(failure_path, &FAILURE_HEADER)?,
        })
    }

    /// Record a completed row.
    pub fn success(
        &mut self,
        entry_id: &str,
        old_asset_id: &str,
        new_asset_id: &str,
    ) -> Result<(), LedgerError> {
        self.success.record(&[entry_id, old_asset_id, new_asset_id])
    }

    /// Record a failed row.  `error` is free text prefixed with the
    /// stage at which the row terminated.
    pub fn failure(
        &mut self,
        entry_id: &str,
        old_asset_id: &str,
        new_asset_id: &str,
        error: &str,
    ) -> Result<(), LedgerError> {
        self.failure
            .record(&[entry_id, old_asset_id, new_asset_id, error])
    }
}
