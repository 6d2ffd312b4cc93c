// # Cloudflare DNS Records Client
//
// `DnsRecordClient` implementation for the Cloudflare API v4.
//
// ## Scope
//
// - ✅ One HTTP request per logical operation (list follows pagination)
// - ✅ Full error propagation: status codes map to `Error` variants that the
//   reconciler classifies as transient or permanent
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ A and AAAA records
// - ✅ Zone discovery for tokens without a configured zone id
// - ❌ NO retry logic (owned by `Reconciler`)
// - ❌ NO name matching beyond the exact query filter (owned by `Reconciler`)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Construction fails fast if the token is empty
//
// ## API Reference
//
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`
// - List Zones: GET `/zones`

use async_trait::async_trait;
use ipsync_core::config::ZoneContext;
use ipsync_core::traits::{DnsRecord, DnsRecordClient, NewRecord, RecordQuery};
use ipsync_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

const PROVIDER: &str = "cloudflare";

/// Cloudflare response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    name: String,
}

/// Cloudflare DNS records client for one zone
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot. All coordination (retries, backoff, failure
/// policy) is owned by the reconciler.
pub struct CloudflareClient {
    /// Zone id and API token
    /// ⚠️ NEVER log the token
    zone: ZoneContext,

    /// API base URL (overridable for tests)
    api_base: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareClient")
            .field("zone_id", &self.zone.zone_id)
            .field("api_token", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl CloudflareClient {
    /// Create a client for the zone in `zone`
    ///
    /// # Security
    ///
    /// The API token will NEVER be logged or displayed in error messages.
    pub fn new(zone: ZoneContext) -> Result<Self> {
        zone.validate()?;
        Ok(Self {
            zone,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            client: http_client()?,
        })
    }

    /// Point the client at another API base (e.g. a mock server)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn zone(&self) -> &ZoneContext {
        &self.zone
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, self.zone.zone_id)
    }

    /// Fetch one page of records
    async fn list_page(&self, query: &RecordQuery, page: u32) -> Result<Envelope<Vec<DnsRecord>>> {
        let mut params: Vec<(&str, String)> = vec![
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(record_type) = query.record_type {
            params.push(("type", record_type.as_str().to_string()));
        }
        if let Some(name) = &query.name {
            params.push(("name", name.clone()));
        }

        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(&self.zone.api_token)
            .query(&params)
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare list request failed: {e}")))?;

        read_envelope(response, "list DNS records").await
    }
}

#[async_trait]
impl DnsRecordClient for CloudflareClient {
    /// List every record matching the query, following pagination
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?per_page=100&page=1&type=A&name=edge.example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn list(&self, query: &RecordQuery) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let envelope = self.list_page(query, page).await?;
            let total_pages = envelope
                .result_info
                .as_ref()
                .map(|info| info.total_pages)
                .unwrap_or(1);
            records.extend(envelope.result.unwrap_or_default());

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!(
            "Listed {} record(s) in zone {} ({} page(s))",
            records.len(),
            self.zone.zone_id,
            page
        );
        Ok(records)
    }

    async fn delete(&self, record_id: &str) -> Result<()> {
        let url = format!("{}/{}", self.records_url(), record_id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.zone.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare delete request failed: {e}")))?;

        let _: Envelope<serde_json::Value> = read_envelope(response, "delete DNS record").await?;
        Ok(())
    }

    /// Create a record
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "A", "name": "edge.example.com", "content": "1.2.3.4", "ttl": 60, "proxied": false}
    /// ```
    async fn create(&self, record: &NewRecord) -> Result<DnsRecord> {
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.zone.api_token)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::http(format!("Cloudflare create request failed: {e}")))?;

        let envelope: Envelope<DnsRecord> = read_envelope(response, "create DNS record").await?;
        envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER, "Invalid response format: create returned no record")
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Discover the first zone visible to `api_token`
///
/// Returns `(zone_id, zone_name)`.
///
/// # API Call
///
/// ```http
/// GET /zones?per_page=1
/// Authorization: Bearer <token>
/// ```
pub async fn discover_zone(api_token: &str, api_base: &str) -> Result<(String, String)> {
    if api_token.trim().is_empty() {
        return Err(Error::config("Cloudflare API token cannot be empty"));
    }

    let url = format!("{}/zones", api_base.trim_end_matches('/'));
    let response = http_client()?
        .get(&url)
        .bearer_auth(api_token)
        .query(&[("per_page", "1")])
        .send()
        .await
        .map_err(|e| Error::http(format!("Cloudflare zone lookup failed: {e}")))?;

    let envelope: Envelope<Vec<Zone>> = read_envelope(response, "list zones").await?;
    let zone = envelope
        .result
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("No zone is visible to this API token"))?;

    tracing::info!("Discovered zone {} ({})", zone.name, zone.id);
    Ok((zone.id, zone.name))
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))
}

/// Check the status, decode the envelope and check `success`
async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> Result<Envelope<T>> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        return Err(Error::from_status(PROVIDER, status.as_u16(), context, &body));
    }

    let envelope: Envelope<T> = response.json().await.map_err(|e| {
        Error::provider(PROVIDER, format!("Failed to parse {context} response: {e}"))
    })?;

    if !envelope.success {
        let detail = envelope
            .errors
            .iter()
            .map(|e| format!("[{}] {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::provider(
            PROVIDER,
            format!("{context} was not successful: {detail}"),
        ));
    }

    Ok(envelope)
}
