//! Secondary run modes: list, publish-drafts, archive-status.
//!
//! Single-call-per-row variants of the replacement loop.  They share
//! the client, the row-skipping rules, and the ledger pair; columns a
//! mode does not produce stay empty.

use std::future::Future;
use std::path::Path;

use relink_contentful::CmaClient;
use relink_core::ledger::Ledgers;
use relink_core::rows;

use crate::source::{open_input, PipelineError, RunSummary};

/// Terminal state of one single-id row.
enum IdRowOutcome {
    /// Written to the success ledger; the two optional columns follow
    /// the mode's convention.
    Success { second: String, third: String },
    /// Written to the failure ledger with a stage-prefixed message.
    Failure { message: String },
}

/// List entries: fetch each entry and record its current link.
///
/// Success rows carry `entry_id, linked_asset_id, ""`.
pub async fn run_list(
    client: &CmaClient,
    input: &Path,
    ledgers: &mut Ledgers,
) -> Result<RunSummary, PipelineError> {
    for_each_id(input, "entry_id", ledgers, |id| async move {
        match client.fetch_entry(&id).await {
            Ok(entry) => {
                tracing::info!(
                    entry_id = %entry.id,
                    version = entry.version,
                    content_type = %entry.content_type_id,
                    linked_asset_id = %entry.linked_asset_id,
                    "Entry"
                );
                IdRowOutcome::Success {
                    second: entry.linked_asset_id,
                    third: String::new(),
                }
            }
            Err(e) => IdRowOutcome::Failure {
                message: format!("fetch entry: {e}"),
            },
        }
    })
    .await
}

/// Publish draft entries at their current version.
///
/// Success rows carry `entry_id, "", ""`.
pub async fn run_publish_drafts(
    client: &CmaClient,
    input: &Path,
    ledgers: &mut Ledgers,
) -> Result<RunSummary, PipelineError> {
    for_each_id(input, "entry_id", ledgers, |id| async move {
        let entry = match client.fetch_entry(&id).await {
            Ok(entry) => entry,
            Err(e) => {
                return IdRowOutcome::Failure {
                    message: format!("fetch entry: {e}"),
                }
            }
        };
        match client.publish_entry(&id, entry.version).await {
            Ok(()) => {
                tracing::info!(entry_id = %id, version = entry.version, "Entry published");
                IdRowOutcome::Success {
                    second: String::new(),
                    third: String::new(),
                }
            }
            Err(e) => IdRowOutcome::Failure {
                message: format!("publish entry: {e}"),
            },
        }
    })
    .await
}

/// Report whether each asset is archived.
///
/// Success rows carry `asset_id, "", <archived|active>`, reusing the
/// third ledger column for the verdict.
pub async fn run_archive_status(
    client: &CmaClient,
    input: &Path,
    ledgers: &mut Ledgers,
) -> Result<RunSummary, PipelineError> {
    for_each_id(input, "asset_id", ledgers, |id| async move {
        match client.fetch_asset(&id).await {
            Ok(asset) => {
                let status = if asset.archived_at.is_some() {
                    "archived"
                } else {
                    "active"
                };
                tracing::info!(asset_id = %asset.id, status, "Asset archive status");
                IdRowOutcome::Success {
                    second: String::new(),
                    third: status.to_string(),
                }
            }
            Err(e) => IdRowOutcome::Failure {
                message: format!("fetch asset: {e}"),
            },
        }
    })
    .await
}

/// Drive `op` over every single-id row of `input`, recording each
/// outcome in the appropriate ledger.
async fn for_each_id<F, Fut>(
    input: &Path,
    column: &'static str,
    ledgers: &mut Ledgers,
    mut op: F,
) -> Result<RunSummary, PipelineError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = IdRowOutcome>,
{
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
        let id = match rows::parse_id_row(&record, row_num, column) {
            Ok(Some(id)) => id,
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
        match op(id.clone()).await {
            IdRowOutcome::Success { second, third } => {
                ledgers.success(&id, &second, &third)?;
                summary.succeeded += 1;
            }
            IdRowOutcome::Failure { message } => {
                tracing::warn!(row = row_num, id = %id, error = %message, "Row failed");
                ledgers.failure(&id, "", "", &message)?;
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
