//! DNS-over-HTTPS source

use ipsync_core::traits::{IpSource, RecordType};
use ipsync_core::{Error, Result};
use serde::Deserialize;

/// JSON answer of a DoH resolver (`application/dns-json`)
#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// Resolves domains through a DoH JSON endpoint
///
/// Only answers whose type code matches the requested record type are
/// kept, so CNAME hops in the answer section are skipped. A domain whose
/// lookup fails contributes nothing; the other domains still count.
pub struct DohSource {
    resolver: String,
    domains: Vec<String>,
    record_type: RecordType,
    client: reqwest::Client,
}

impl DohSource {
    pub fn new(resolver: impl Into<String>, domains: Vec<String>) -> Result<Self> {
        Ok(Self {
            resolver: resolver.into().trim_end_matches('/').to_string(),
            domains,
            record_type: RecordType::A,
            client: crate::http_client()?,
        })
    }

    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    /// Resolve one domain
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /resolve?name=cf.example.com&type=A
    /// Accept: application/dns-json
    /// ```
    async fn resolve(&self, domain: &str) -> Result<Vec<String>> {
        let url = format!("{}/resolve", self.resolver);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/dns-json")
            .query(&[("name", domain), ("type", self.record_type.as_str())])
            .send()
            .await
            .map_err(|e| Error::http(format!("DoH request for {domain} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("doh", status.as_u16(), "resolve", &body));
        }

        let parsed: DohResponse = response
            .json()
            .await
            .map_err(|e| Error::ip_source(format!("Invalid DoH answer for {domain}: {e}")))?;

        let code = self.record_type.code();
        Ok(parsed
            .answer
            .into_iter()
            .filter(|a| a.record_type == code)
            .map(|a| a.data.trim().to_string())
            .collect())
    }
}

#[async_trait::async_trait]
impl IpSource for DohSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for domain in self.domains.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
            match self.resolve(domain).await {
                Ok(addresses) => {
                    tracing::debug!("{} resolved to {} address(es)", domain, addresses.len());
                    found.extend(addresses);
                }
                Err(e) => {
                    tracing::warn!("DoH lookup of {} failed, skipping: {}", domain, e);
                }
            }
        }
        Ok(found)
    }

    fn source_name(&self) -> &'static str {
        "doh"
    }
}
