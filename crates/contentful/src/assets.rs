//! Asset operations: fetch, create-and-publish, unpublish, archive.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::client::{ApiError, CmaClient, CMA_CONTENT_TYPE, VERSION_HEADER};

/// Interval between polls while a created asset's binary is processed.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hard cap on processing polls (~60 s at the default interval).
pub const PROCESS_POLL_ATTEMPTS: u32 = 60;

/// Poll cadence for asset binary processing.  Fixed per run; see
/// [`CmaClient::with_processing_poll`](crate::CmaClient::with_processing_poll).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollSettings {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: PROCESS_POLL_INTERVAL,
            attempts: PROCESS_POLL_ATTEMPTS,
        }
    }
}

/// Minimal view of a CMA asset.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: String,
    /// Optimistic-concurrency token, bumped server-side on every
    /// mutation.
    pub version: i64,
    /// Localized file name; empty when the locale key is absent.
    pub file_name: String,
    /// Localized file URL; empty when the locale key is absent or the
    /// binary has not finished processing.
    pub file_url: String,
    /// Localized MIME type; empty when the locale key is absent.
    pub content_type: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Set iff the asset is archived.
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    sys: AssetSys,
    #[serde(default)]
    fields: AssetFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetSys {
    id: String,
    version: i64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetFields {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    description: HashMap<String, String>,
    #[serde(default)]
    file: HashMap<String, AssetFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetFile {
    #[serde(default)]
    url: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    content_type: String,
}

/// Response shape for calls where only `sys.id` matters.
#[derive(Debug, Deserialize)]
struct IdOnly {
    sys: IdSys,
}

#[derive(Debug, Deserialize)]
struct IdSys {
    id: String,
}

/// Response shape for the processing poll: the latest version plus
/// whatever file field exists so far.
#[derive(Debug, Deserialize)]
struct PollResponse {
    sys: PollSys,
    #[serde(default)]
    fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PollSys {
    version: i64,
}

impl CmaClient {
    /// Fetch a single asset.  Localized scalars default to empty when
    /// the configured locale key is absent.
    pub async fn fetch_asset(&self, asset_id: &str) -> Result<Asset, ApiError> {
        let url = self.api_url(&format!("/assets/{asset_id}"));
        let response = self
            .authorize(self.http().get(&url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let parsed: AssetResponse = Self::parse_json(response).await?;

        let file = parsed.fields.file.get(self.locale());
        let asset = Asset {
            id: parsed.sys.id,
            version: parsed.sys.version,
            file_name: file.map(|f| f.file_name.clone()).unwrap_or_default(),
            file_url: file.map(|f| f.url.clone()).unwrap_or_default(),
            content_type: file.map(|f| f.content_type.clone()).unwrap_or_default(),
            title: parsed
                .fields
                .title
                .get(self.locale())
                .cloned()
                .unwrap_or_default(),
            description: parsed
                .fields
                .description
                .get(self.locale())
                .cloned()
                .unwrap_or_default(),
            created_at: parsed.sys.created_at,
            archived_at: parsed.sys.archived_at,
        };

        tracing::debug!(
            asset_id = %asset.id,
            version = asset.version,
            file_name = %asset.file_name,
            "Fetched asset"
        );
        Ok(asset)
    }

    /// Upload a local file as a brand-new published asset.
    ///
    /// Four phases: POST the raw bytes to the upload host, create an
    /// asset record referencing the upload handle, request binary
    /// processing, then poll until a file URL appears and publish at
    /// the last-observed version.  Returns the new asset id.
    ///
    /// If processing never completes within the poll cap the asset is
    /// left unpublished and [`ApiError::ProcessingTimeout`] is
    /// returned; callers treat it as terminal for the row.
    pub async fn create_and_publish_asset(
        &self,
        local_path: &Path,
        file_name: &str,
        content_type: &str,
        title: &str,
        description: &str,
    ) -> Result<String, ApiError> {
        // 1) Stream the raw bytes from disk.
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .authorize(self.http().post(self.upload_url("/uploads")))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        let upload: IdOnly = Self::parse_json(response).await?;

        // 2) Create the asset record referencing the upload handle.
        let title = if title.trim().is_empty() { file_name } else { title };
        let locale = self.locale();
        let payload = serde_json::json!({
            "fields": {
                "title": { locale: title },
                "description": { locale: description },
                "file": { locale: {
                    "fileName": file_name,
                    "contentType": content_type,
                    "uploadFrom": { "sys": {
                        "type": "Link",
                        "linkType": "Upload",
                        "id": upload.sys.id,
                    }},
                }},
            },
        });
        let response = self
            .authorize(self.http().post(self.api_url("/assets")))
            .header(header::CONTENT_TYPE, CMA_CONTENT_TYPE)
            .json(&payload)
            .send()
            .await?;
        let created: IdOnly = Self::parse_json(response).await?;
        let new_asset_id = created.sys.id;
        tracing::debug!(asset_id = %new_asset_id, file_name, "Created asset record");

        // 3) Request binary processing.
        let process_url =
            self.api_url(&format!("/assets/{new_asset_id}/files/{locale}/process"));
        let response = self
            .authorize(self.http().put(&process_url))
            .header(header::ACCEPT, CMA_CONTENT_TYPE)
            .send()
            .await?;
        Self::check_status(response).await?;

        // 4) Poll until a file URL appears, tracking the latest
        //    version the backend assigns along the way.
        let get_url = self.api_url(&format!("/assets/{new_asset_id}"));
        let mut latest_version = 0;
        let mut processed = false;
        for attempt in 0..self.poll().attempts {
            let response = self
                .authorize(self.http().get(&get_url))
                .header(header::ACCEPT, CMA_CONTENT_TYPE)
                .send()
                .await?;
            let poll: PollResponse = Self::parse_json(response).await?;
            latest_version = poll.sys.version;

            if has_file_url(&poll.fields, locale) {
                tracing::debug!(
                    asset_id = %new_asset_id,
                    attempt = attempt + 1,
                    version = latest_version,
                    "Asset processing complete"
                );
                processed = true;
                break;
            }
            tokio::time::sleep(self.poll().interval).await;
        }
        if !processed {
            return Err(ApiError::ProcessingTimeout {
                asset_id: new_asset_id,
            });
        }

        // 5) Publish at the last-observed version.
        let publish_url = self.api_url(&format!("/assets/{new_asset_id}/published"));
        let response = self
            .authorize(self.http().put(&publish_url))
            .header(header::ACCEPT, CMA_CONTENT_TYPE)
            .header(VERSION_HEADER, latest_version.to_string())
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::debug!(asset_id = %new_asset_id, "Published new asset");
        Ok(new_asset_id)
    }

    /// Unpublish an asset.  Returns the version the backend assigns
    /// after the unpublish, which the subsequent archive must use.
    pub async fn unpublish_asset(&self, asset_id: &str, version: i64) -> Result<i64, ApiError> {
        let url = self.api_url(&format!("/assets/{asset_id}/published"));
        let response = self
            .authorize(self.http().delete(&url))
            .header(header::ACCEPT, CMA_CONTENT_TYPE)
            .header(VERSION_HEADER, version.to_string())
            .send()
            .await?;
        let parsed: PollResponse = Self::parse_json(response).await?;

        tracing::debug!(asset_id, new_version = parsed.sys.version, "Unpublished asset");
        Ok(parsed.sys.version)
    }

    /// Archive an asset.
    ///
    /// The CMA archive contract is not a bare status flip: the current
    /// resource is read back and the entire body is resubmitted with
    /// `sys.archivedAt` stamped on.  This quirk is preserved here only;
    /// every other mutating call sends a minimal request.
    pub async fn archive_asset(&self, asset_id: &str, version: i64) -> Result<(), ApiError> {
        let get_url = self.api_url(&format!("/assets/{asset_id}"));
        let response = self
            .authorize(self.http().get(&get_url))
            .header(header::ACCEPT, CMA_CONTENT_TYPE)
            .send()
            .await?;
        let mut body: serde_json::Value = Self::parse_json(response).await?;

        let sys = body
            .get_mut("sys")
            .and_then(serde_json::Value::as_object_mut)
            .ok_or_else(|| ApiError::Decode("asset response is missing sys".to_string()))?;
        sys.insert(
            "archivedAt".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );

        let archive_url = self.api_url(&format!("/assets/{asset_id}/archived?version={version}"));
        let response = self
            .authorize(self.http().put(&archive_url))
            .header(header::CONTENT_TYPE, CMA_CONTENT_TYPE)
            .header(VERSION_HEADER, version.to_string())
            .json(&body)
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::debug!(asset_id, version, "Archived asset");
        Ok(())
    }
}

/// Whether `fields.file.<locale>.url` holds a non-empty string.
fn has_file_url(fields: &serde_json::Value, locale: &str) -> bool {
    fields
        .get("file")
        .and_then(|f| f.get(locale))
        .and_then(|l| l.get("url"))
        .and_then(|u| u.as_str())
        .is_some_and(|u| !u.trim().is_empty())
}
