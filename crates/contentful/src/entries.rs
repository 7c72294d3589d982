//! Entry operations: fetch, link patch, publish.

use std::collections::HashMap;

use reqwest::header;
use serde::Deserialize;

use crate::client::{ApiError, CmaClient, CMA_CONTENT_TYPE, VERSION_HEADER};

/// Minimal view of a CMA entry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: String,
    /// Optimistic-concurrency token; the backend bumps it on every
    /// mutation, so it is only valid until the next write.
    pub version: i64,
    pub content_type_id: String,
    /// Id of the asset linked by the configured field, or empty when
    /// any segment of the field path is absent.
    pub linked_asset_id: String,
    /// Per-field, per-locale publication status as reported by the CMA.
    pub field_status: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct EntryResponse {
    sys: EntrySys,
    #[serde(default)]
    fields: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntrySys {
    id: String,
    version: i64,
    #[serde(default)]
    content_type: Option<SysLink>,
    #[serde(default)]
    field_status: Option<HashMap<String, HashMap<String, String>>>,
}

#[derive(Debug, Deserialize)]
struct SysLink {
    sys: SysLinkInner,
}

#[derive(Debug, Deserialize)]
struct SysLinkInner {
    id: String,
}

/// Response shape for calls where only the assigned version matters.
#[derive(Debug, Deserialize)]
struct VersionOnly {
    sys: VersionSys,
}

#[derive(Debug, Deserialize)]
struct VersionSys {
    version: i64,
}

impl CmaClient {
    /// Fetch a single entry.
    pub async fn fetch_entry(&self, entry_id: &str) -> Result<Entry, ApiError> {
        let url = self.api_url(&format!("/entries/{entry_id}"));
        let response = self
            .authorize(self.http().get(&url))
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let parsed: EntryResponse = Self::parse_json(response).await?;

        let linked_asset_id = linked_asset_id(&parsed.fields, self.field_key(), self.locale());
        tracing::debug!(
            entry_id = %parsed.sys.id,
            version = parsed.sys.version,
            linked_asset_id = %linked_asset_id,
            "Fetched entry"
        );

        Ok(Entry {
            id: parsed.sys.id,
            version: parsed.sys.version,
            content_type_id: parsed.sys.content_type.map(|ct| ct.sys.id).unwrap_or_default(),
            linked_asset_id,
            field_status: parsed.sys.field_status.unwrap_or_default(),
        })
    }

    /// Repoint the entry's configured link field at `new_asset_id`.
    ///
    /// Sends a single JSON Patch `replace` op.  Returns the version the
    /// backend assigns after the patch; callers must use it (not the
    /// pre-patch version) for the subsequent publish.
    pub async fn patch_entry_link(
        &self,
        entry_id: &str,
        new_asset_id: &str,
        version: i64,
    ) -> Result<i64, ApiError> {
        let url = self.api_url(&format!("/entries/{entry_id}"));
        let patch = serde_json::json!([{
            "op": "replace",
            "path": format!("/fields/{}/{}", self.field_key(), self.locale()),
            "value": {
                "sys": {
                    "type": "Link",
                    "linkType": "Asset",
                    "id": new_asset_id,
                },
            },
        }]);

        let response = self
            .authorize(self.http().patch(&url))
            .header(header::CONTENT_TYPE, "application/json-patch+json")
            .header(VERSION_HEADER, version.to_string())
            .json(&patch)
            .send()
            .await?;
        let parsed: VersionOnly = Self::parse_json(response).await?;

        tracing::debug!(
            entry_id,
            new_asset_id,
            new_version = parsed.sys.version,
            "Patched entry asset link"
        );
        Ok(parsed.sys.version)
    }

    /// Publish an entry at the supplied version.
    pub async fn publish_entry(&self, entry_id: &str, version: i64) -> Result<(), ApiError> {
        let url = self.api_url(&format!("/entries/{entry_id}/published"));
        let response = self
            .authorize(self.http().put(&url))
            .header(header::ACCEPT, CMA_CONTENT_TYPE)
            .header(VERSION_HEADER, version.to_string())
            .send()
            .await?;
        Self::check_status(response).await?;

        tracing::debug!(entry_id, version, "Published entry");
        Ok(())
    }
}

/// Walk `fields.<field_key>.<locale>.sys.id`; any absent segment yields
/// an empty id rather than an error.
fn linked_asset_id(fields: &serde_json::Value, field_key: &str, locale: &str) -> String {
    fields
        .get(field_key)
        .and_then(|f| f.get(locale))
        .and_then(|l| l.get("sys"))
        .and_then(|s| s.get("id"))
        .and_then(|id| id.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_asset_id_walks_full_path() {
        let fields = serde_json::json!({
            "downloadableFile": {
                "en-US": { "sys": { "type": "Link", "linkType": "Asset", "id": "A1" } }
            }
        });
        assert_eq!(linked_asset_id(&fields, "downloadableFile", "en-US"), "A1");
    }

    #[test]
    fn linked_asset_id_defaults_on_absent_segments() {
        let no_field = serde_json::json!({});
        assert_eq!(linked_asset_id(&no_field, "downloadableFile", "en-US"), "");

        let no_locale = serde_json::json!({ "downloadableFile": {} });
        assert_eq!(linked_asset_id(&no_locale, "downloadableFile", "en-US"), "");

        let no_sys = serde_json::json!({ "downloadableFile": { "en-US": {} } });
        assert_eq!(linked_asset_id(&no_sys, "downloadableFile", "en-US"), "");
    }
}
