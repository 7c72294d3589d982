//! Local download of an asset's binary file.
//!
//! Asset file URLs come back from the CMA in protocol-relative form
//! (`//assets...`); [`ensure_https`] normalizes them before the
//! transfer.  Saved files get a collision stamp derived from the
//! asset's creation time so reruns never overwrite earlier downloads.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use relink_core::naming;
use tokio::io::AsyncWriteExt;

use crate::{Asset, CmaClient};

/// Errors downloading an asset file.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The asset carries no file URL (e.g. processing never finished).
    #[error("asset {0} has an empty file URL")]
    EmptyUrl(String),

    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The file host returned a non-2xx status code.
    #[error("download returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Creating the destination directory or writing the file failed.
    #[error("local write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Rewrite a protocol-relative or insecure URL to `https`; anything
/// else passes through unchanged.
pub fn ensure_https(url: &str) -> String {
    let trimmed = url.trim();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return format!("https://{rest}");
    }
    if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("http://") {
        return format!("https://{}", &trimmed[7..]);
    }
    trimmed.to_string()
}

/// Resolve the URL the transfer actually hits.  Protocol-relative
/// URLs always get a scheme; the insecure-scheme rewrite is skipped
/// when the client opted out.
fn resolve_file_url(url: &str, force_https: bool) -> String {
    if force_https {
        return ensure_https(url);
    }
    let trimmed = url.trim();
    if let Some(rest) = trimmed.strip_prefix("//") {
        return format!("https://{rest}");
    }
    trimmed.to_string()
}

/// Download the asset's file into `dest_dir`, returning the saved path.
///
/// The base file name comes from the asset's declared name, falling
/// back to the URL path basename, falling back to the asset id; a
/// collision stamp is inserted before the extension.  `dest_dir` is
/// created if absent.  The body is streamed to disk chunk by chunk.
pub async fn download_asset_file(
    client: &CmaClient,
    asset: &Asset,
    dest_dir: &Path,
) -> Result<PathBuf, DownloadError> {
    if asset.file_url.trim().is_empty() {
        return Err(DownloadError::EmptyUrl(asset.id.clone()));
    }
    let url = resolve_file_url(&asset.file_url, client.rewrites_insecure_urls());

    tokio::fs::create_dir_all(dest_dir).await?;

    let base_name = base_file_name(asset, &url);
    let stamp = naming::collision_stamp(asset.created_at);
    let file_name = naming::timestamped_filename(&base_name, &stamp);
    let dest_path = dest_dir.join(file_name);

    let response = client.http().get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.trim().chars().take(2048).collect();
        return Err(DownloadError::Status {
            status: status.as_u16(),
            body: snippet,
        });
    }

    let mut file = tokio::fs::File::create(&dest_path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::debug!(
        asset_id = %asset.id,
        path = %dest_path.display(),
        bytes = written,
        "Downloaded asset file"
    );
    Ok(dest_path)
}

/// Declared file name, else URL path basename, else asset id.
fn base_file_name(asset: &Asset, url: &str) -> String {
    let declared = asset.file_name.trim();
    if !declared.is_empty() {
        return declared.to_string();
    }
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(base) = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|s| !s.is_empty())
        {
            return base.to_string();
        }
    }
    asset.id.clone()
}
