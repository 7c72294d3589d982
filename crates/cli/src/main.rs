//! `relink` — batch asset replacement against the Contentful
//! Management API.
//!
//! Reads an input CSV, drives each row through the selected mode, and
//! appends every outcome to the success/failure ledgers.  Per-row
//! failures never fail the process: the exit code reflects only
//! whether the run itself completed, and callers inspect the failure
//! ledger for row-level problems.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relink_contentful::{Auth, CmaClient, CmaConfig};
use relink_core::ledger::Ledgers;
use relink_pipeline::{modes, run_replace, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Replace each entry's linked asset with a fresh copy (default).
    Replace,
    /// Fetch each entry and report its current asset link.
    List,
    /// Publish each entry at its current version.
    PublishDrafts,
    /// Report whether each asset is archived.
    ArchiveStatus,
}

#[derive(Debug, Parser)]
#[command(name = "relink", about = "Replace Contentful entry assets in bulk")]
struct Args {
    /// Input CSV (replace mode: entry_id,asset_id; list/publish-drafts:
    /// entry_id; archive-status: asset_id).
    #[arg(long, default_value = "id.csv")]
    csv: PathBuf,

    /// Bearer token for the management API.
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    token: String,

    /// Target space.
    #[arg(long, env = "SPACE_ID")]
    space_id: String,

    /// Target environment.
    #[arg(long, default_value = "testing_env")]
    environment: String,

    /// Header carrying the credentials.
    #[arg(long, default_value = "Authorization")]
    auth_header: String,

    /// Credential scheme prefix.
    #[arg(long, default_value = "Bearer")]
    scheme: String,

    /// Per-call network timeout in seconds.
    #[arg(long, default_value_t = 20)]
    timeout_secs: u64,

    /// What to do with each row.
    #[arg(long, value_enum, default_value_t = Mode::Replace)]
    mode: Mode,

    /// Directory for downloaded asset files (created if absent).
    #[arg(long, default_value = "downloaded")]
    dest_dir: PathBuf,

    /// Success ledger (appended to across runs).
    #[arg(long, default_value = "success.csv")]
    success_out: PathBuf,

    /// Failure ledger (appended to across runs).
    #[arg(long, default_value = "failed.csv")]
    failed_out: PathBuf,

    /// Entry field holding the asset link.
    #[arg(long, default_value = "downloadableFile")]
    field_key: String,

    /// Locale key for localized fields.
    #[arg(long, default_value = "en-US")]
    locale: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relink=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Pre-flight: blank credentials abort before any row is touched.
    anyhow::ensure!(
        !args.token.trim().is_empty(),
        "missing token: pass --token or set API_TOKEN"
    );
    anyhow::ensure!(
        !args.space_id.trim().is_empty(),
        "missing space id: pass --space-id or set SPACE_ID"
    );
    anyhow::ensure!(
        args.csv.exists(),
        "input CSV {} does not exist",
        args.csv.display()
    );

    let client = CmaClient::new(CmaConfig {
        space_id: args.space_id.clone(),
        environment: args.environment.clone(),
        auth: Auth {
            header_name: args.auth_header.clone(),
            scheme: args.scheme.clone(),
            token: args.token.clone(),
        },
        field_key: args.field_key.clone(),
        locale: args.locale.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })
    .context("failed to build HTTP client")?;

    let mut ledgers =
        Ledgers::open(&args.success_out, &args.failed_out).context("failed to open ledgers")?;

    tracing::info!(
        mode = ?args.mode,
        input = %args.csv.display(),
        environment = %args.environment,
        "Starting run"
    );

    let summary: RunSummary = match args.mode {
        Mode::Replace => {
            run_replace(&client, &args.csv, &args.dest_dir, &mut ledgers).await?
        }
        Mode::List => modes::run_list(&client, &args.csv, &mut ledgers).await?,
        Mode::PublishDrafts => {
            modes::run_publish_drafts(&client, &args.csv, &mut ledgers).await?
        }
        Mode::ArchiveStatus => {
            modes::run_archive_status(&client, &args.csv, &mut ledgers).await?
        }
    };

    tracing::info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Run complete"
    );
    Ok(())
}
