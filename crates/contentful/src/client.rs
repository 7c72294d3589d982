//! HTTP plumbing shared by every CMA call.
//!
//! [`CmaClient`] holds one [`reqwest::Client`] (carrying the run-wide
//! timeout), the API and upload base URLs, the space/environment
//! coordinates, and the bearer credentials.  The per-resource
//! operations live in the `entries` and `assets` modules.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::assets::PollSettings;

/// Header carrying the optimistic-concurrency version on every
/// mutating call.
pub const VERSION_HEADER: &str = "X-Contentful-Version";

/// Content type of CMA JSON request bodies.
pub(crate) const CMA_CONTENT_TYPE: &str = "application/vnd.contentful.management.v1+json";

/// Default CMA endpoint.
const DEFAULT_API_BASE: &str = "https://api.contentful.com";

/// Default binary-upload endpoint (a distinct host from the API).
const DEFAULT_UPLOAD_BASE: &str = "https://upload.contentful.com";

/// Maximum number of response-body bytes kept in error messages.
const BODY_SNIPPET_LIMIT: usize = 4096;

/// Bearer credentials, composed as `"{scheme} {token}"` trimmed of
/// incidental whitespace.
#[derive(Debug, Clone)]
pub struct Auth {
    /// Header to send the credentials in (normally `Authorization`).
    pub header_name: String,
    /// Scheme prefix, e.g. `Bearer`.
    pub scheme: String,
    /// The token itself.
    pub token: String,
}

impl Auth {
    /// Render the header value.
    pub(crate) fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token).trim().to_string()
    }
}

/// Everything needed to construct a [`CmaClient`].
#[derive(Debug, Clone)]
pub struct CmaConfig {
    /// Target space identifier.
    pub space_id: String,
    /// Target environment identifier.
    pub environment: String,
    /// Bearer credentials.
    pub auth: Auth,
    /// Entry field holding the asset link (e.g. `downloadableFile`).
    pub field_key: String,
    /// Locale key for localized fields (e.g. `en-US`).
    pub locale: String,
    /// Timeout applied to every individual network call.
    pub timeout: Duration,
}

/// Errors from the CMA layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The CMA returned a non-2xx status code.
    #[error("CMA returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, capped at 4 KiB.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode CMA response: {0}")]
    Decode(String),

    /// Reading the local file to upload failed.
    #[error("failed to read upload file: {0}")]
    Io(#[from] std::io::Error),

    /// Binary processing of a created asset never produced a file URL
    /// within the poll cap.  Terminal; the caller does not retry.
    #[error("asset {asset_id} processing did not complete: file URL missing")]
    ProcessingTimeout {
        /// Id of the asset whose processing stalled.
        asset_id: String,
    },
}

/// Client for one space/environment of the Contentful Management API.
pub struct CmaClient {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
    config: CmaConfig,
    poll: PollSettings,
    force_https: bool,
}

impl CmaClient {
    /// Create a client against the production CMA endpoints.
    pub fn new(config: CmaConfig) -> Result<Self, ApiError> {
        Self::with_base_urls(config, DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE)
    }

    /// Create a client against explicit base URLs (mock servers,
    /// gateways).  Trailing slashes are trimmed.
    pub fn with_base_urls(
        config: CmaConfig,
        api_base: &str,
        upload_base: &str,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            config,
            poll: PollSettings::default(),
            force_https: true,
        })
    }

    /// Skip the `https` rewrite on asset file URLs (protocol-relative
    /// URLs still get a scheme).
    ///
    /// Delivery hosts are reached over TLS by default; local mock
    /// servers speak plain HTTP, so their tests opt out.
    pub fn with_insecure_downloads(mut self) -> Self {
        self.force_https = false;
        self
    }

    pub(crate) fn rewrites_insecure_urls(&self) -> bool {
        self.force_https
    }

    /// Override the asset-processing poll cadence.
    ///
    /// The default (1 s interval, 60 attempts) matches the upstream
    /// contract and is not exposed as a run option; tests shrink it so
    /// the timeout path completes in milliseconds.
    pub fn with_processing_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.poll = PollSettings { interval, attempts };
        self
    }

    /// The underlying HTTP client (shares the run-wide timeout).
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Entry field key holding the asset link.
    pub fn field_key(&self) -> &str {
        &self.config.field_key
    }

    /// Locale key used for localized fields.
    pub fn locale(&self) -> &str {
        &self.config.locale
    }

    pub(crate) fn poll(&self) -> &PollSettings {
        &self.poll
    }

    /// `{api_base}/spaces/{space}/environments/{env}{suffix}`.
    pub(crate) fn api_url(&self, suffix: &str) -> String {
        format!(
            "{}/spaces/{}/environments/{}{}",
            self.api_base, self.config.space_id, self.config.environment, suffix
        )
    }

    /// `{upload_base}/spaces/{space}{suffix}`.
    pub(crate) fn upload_url(&self, suffix: &str) -> String {
        format!("{}/spaces/{}{}", self.upload_base, self.config.space_id, suffix)
    }

    /// Attach the configured credential header to a request.
    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(self.config.auth.header_name.as_str(), self.config.auth.header_value())
    }

    /// Reject non-2xx responses, keeping a bounded body snippet for
    /// the error message.
    pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.trim().chars().take(BODY_SNIPPET_LIMIT).collect();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: snippet,
            });
        }
        Ok(response)
    }

    /// Check the status, then decode the body as JSON.
    pub(crate) async fn parse_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
