// # GitHub Content Store
//
// `ContentStore` implementation for the GitHub repository contents API.
//
// ## Update protocol
//
// 1. GET the file to learn its blob `sha` (404 means the file is new)
// 2. PUT the base64-encoded content with that `sha`
//
// The sha is looked up immediately before each write so a concurrent
// change is reported as a conflict instead of being overwritten.
//
// ## API Reference
//
// - Get contents: GET `/repos/:owner/:repo/contents/:path`
// - Create or update: PUT `/repos/:owner/:repo/contents/:path`

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ipsync_core::config::PublisherConfig;
use ipsync_core::traits::{ContentStore, ContentUpdate};
use ipsync_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ipsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

/// GitHub contents API store for one repository
pub struct GithubContentStore {
    /// ⚠️ holds the access token; NEVER log it
    config: PublisherConfig,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the token
impl std::fmt::Debug for GithubContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubContentStore")
            .field("api_base", &self.config.api_base)
            .field("repository", &self.config.repository)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl GithubContentStore {
    pub fn new(config: PublisherConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.repository,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.contents_url(path))
            .header("Authorization", format!("token {}", self.config.token))
            .header("Accept", "application/vnd.github+json")
    }
}

#[async_trait]
impl ContentStore for GithubContentStore {
    async fn revision(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| Error::http(format!("GitHub contents lookup failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("github", status.as_u16(), "get contents", &body));
        }

        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|e| Error::publisher(format!("Invalid contents response for {path}: {e}")))?;
        Ok(Some(contents.sha))
    }

    async fn publish(&self, update: &ContentUpdate) -> Result<()> {
        let body = PutRequest {
            message: &update.message,
            content: BASE64.encode(update.content.as_bytes()),
            sha: update.revision.as_deref(),
        };

        let response = self
            .request(reqwest::Method::PUT, &update.path)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::http(format!("GitHub contents update failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(Error::publisher(format!(
                "Updating {} failed with status {}: {}",
                update.path,
                status.as_u16(),
                message
            )));
        }

        tracing::debug!(
            "{} {} in {}",
            if status == reqwest::StatusCode::CREATED { "Created" } else { "Updated" },
            update.path,
            self.config.repository
        );
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "github"
    }
}
