//! The per-row asset replacement sequence.
//!
//! Each row walks a forced order of remote calls; any failure
//! terminates the row at that stage and the run moves on to the next
//! row.  The new asset is fully created and published before the old
//! one is touched, so a partial failure never leaves the entry
//! pointing at a dead or archived asset.  After the entry republish, a
//! validation re-fetch confirms the entry really carries the new asset
//! id before a success is recorded.

use std::fmt;
use std::path::Path;

use relink_contentful::{download, ApiError, CmaClient};
use relink_core::ledger::Ledgers;
use relink_core::naming;
use relink_core::rows;

use crate::source::{open_input, PipelineError, RunSummary};

/// The stages of the replacement sequence, in execution order.
///
/// The display name of the failing stage prefixes the error text in
/// the failure ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchEntry,
    FetchAsset,
    Download,
    CreateNewAsset,
    UnpublishOld,
    ArchiveOld,
    PatchEntryLink,
    PublishEntry,
    Validate,
}

impl Stage {
    /// Stable human-readable name used in ledger error prefixes.
    pub fn label(self) -> &'static str {
        match self {
            Stage::FetchEntry => "fetch entry",
            Stage::FetchAsset => "fetch asset",
            Stage::Download => "download file",
            Stage::CreateNewAsset => "create new asset",
            Stage::UnpublishOld => "unpublish old asset",
            Stage::ArchiveOld => "archive old asset",
            Stage::PatchEntryLink => "patch entry",
            Stage::PublishEntry => "publish entry",
            Stage::Validate => "validation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A row that terminated before `SUCCESS`.
struct RowFailure {
    stage: Stage,
    /// Empty unless the new asset was fully created and published
    /// before the failure.
    new_asset_id: String,
    message: String,
}

impl RowFailure {
    fn at(stage: Stage, error: &ApiError) -> Self {
        Self {
            stage,
            new_asset_id: String::new(),
            message: error.to_string(),
        }
    }

    fn with_new_asset(stage: Stage, new_asset_id: &str, error: &ApiError) -> Self {
        Self {
            stage,
            new_asset_id: new_asset_id.to_string(),
            message: error.to_string(),
        }
    }
}

/// Run the default replacement mode over every row of `input`.
///
/// Returns counters for logging; per-row outcomes are in the ledgers.
pub async fn run_replace(
    client: &CmaClient,
    input: &Path,
    dest_dir: &Path,
    ledgers: &mut Ledgers,
) -> Result<RunSummary, PipelineError> {
    let mut reader = open_input(input)?;
    let mut summary = RunSummary::default();
    let mut row_num = 0u64;

    for record in reader.records() {
        row_num += 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(row = row_num, error = %e, "Skipping unreadable row");
                summary.skipped += 1;
                continue;
            }
        };
        let row = match rows::parse_replace_row(&record, row_num) {
            Ok(Some(row)) => row,
            Ok(None) => {
                tracing::debug!(row = row_num, "Skipping header row");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(row = row_num, error = %e, "Skipping row");
                summary.skipped += 1;
                continue;
            }
        };

        summary.processed += 1;
        match replace_row(client, dest_dir, &row.entry_id, &row.asset_id).await {
            Ok(new_asset_id) => {
                tracing::info!(
                    row = row_num,
                    entry_id = %row.entry_id,
                    old_asset_id = %row.asset_id,
                    new_asset_id = %new_asset_id,
                    "Replacement validated"
                );
                ledgers.success(&row.entry_id, &row.asset_id, &new_asset_id)?;
                summary.succeeded += 1;
            }
            Err(failure) => {
                tracing::warn!(
                    row = row_num,
                    entry_id = %row.entry_id,
                    old_asset_id = %row.asset_id,
                    stage = %failure.stage,
                    error = %failure.message,
                    "Row failed"
                );
                ledgers.failure(
                    &row.entry_id,
                    &row.asset_id,
                    &failure.new_asset_id,
                    &format!("{}: {}", failure.stage, failure.message),
                )?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Drive one row to a terminal state.  Returns the new asset id on
/// success.
async fn replace_row(
    client: &CmaClient,
    dest_dir: &Path,
    entry_id: &str,
    asset_id: &str,
) -> Result<String, RowFailure> {
    let entry = client
        .fetch_entry(entry_id)
        .await
        .map_err(|e| RowFailure::at(Stage::FetchEntry, &e))?;

    let asset = client
        .fetch_asset(asset_id)
        .await
        .map_err(|e| RowFailure::at(Stage::FetchAsset, &e))?;

    let saved_path = download::download_asset_file(client, &asset, dest_dir)
        .await
        .map_err(|e| RowFailure {
            stage: Stage::Download,
            new_asset_id: String::new(),
            message: e.to_string(),
        })?;

    // Re-upload under the asset's original name: strip the collision
    // stamp the download step added.
    let stamp = naming::collision_stamp(asset.created_at);
    let upload_name = if asset.file_name.trim().is_empty() {
        saved_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(asset_id)
            .to_string()
    } else {
        asset.file_name.clone()
    };
    let upload_name = naming::strip_timestamp_suffix(&upload_name, &stamp);

    // The new asset must exist and be published before the old one is
    // retired.
    let new_asset_id = client
        .create_and_publish_asset(
            &saved_path,
            &upload_name,
            &asset.content_type,
            &asset.title,
            &asset.description,
        )
        .await
        .map_err(|e| RowFailure::at(Stage::CreateNewAsset, &e))?;

    let archived_version = client
        .unpublish_asset(asset_id, asset.version)
        .await
        .map_err(|e| RowFailure::with_new_asset(Stage::UnpublishOld, &new_asset_id, &e))?;

    client
        .archive_asset(asset_id, archived_version)
        .await
        .map_err(|e| RowFailure::with_new_asset(Stage::ArchiveOld, &new_asset_id, &e))?;

    let patched_version = client
        .patch_entry_link(entry_id, &new_asset_id, entry.version)
        .await
        .map_err(|e| RowFailure::with_new_asset(Stage::PatchEntryLink, &new_asset_id, &e))?;

    client
        .publish_entry(entry_id, patched_version)
        .await
        .map_err(|e| RowFailure::with_new_asset(Stage::PublishEntry, &new_asset_id, &e))?;

    // Catches eventual-consistency anomalies and silently rejected
    // patches: every call above can succeed while the entry still
    // carries the old link.
    let validated = client
        .fetch_entry(entry_id)
        .await
        .map_err(|e| RowFailure::with_new_asset(Stage::Validate, &new_asset_id, &e))?;
    if validated.linked_asset_id != new_asset_id {
        return Err(RowFailure {
            stage: Stage::Validate,
            new_asset_id: new_asset_id.clone(),
            message: format!(
                "expected asset {new_asset_id} but found {}",
                validated.linked_asset_id
            ),
        });
    }

    Ok(new_asset_id)
}
