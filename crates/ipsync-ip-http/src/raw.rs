//! Plain-text list source

use ipsync_core::config::IpVersion;
use ipsync_core::retry::RetryPolicy;
use ipsync_core::traits::IpSource;
use ipsync_core::{Error, Result};
use std::net::IpAddr;

/// Fetches a list with one address per line
///
/// Empty lines are skipped and lines that are not address literals are
/// dropped. With a version set, addresses of the other family are dropped
/// too. The limit counts surviving lines only.
pub struct RawListSource {
    url: String,
    version: Option<IpVersion>,
    limit: Option<usize>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl RawListSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            version: None,
            limit: None,
            retry: RetryPolicy::none(),
            client: crate::http_client()?,
        })
    }

    pub fn with_version(mut self, version: Option<IpVersion>) -> Self {
        self.version = version;
        self
    }

    /// Keep at most `limit` addresses (`None` = all)
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_body(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("raw-list", status.as_u16(), "fetch list", &body));
        }

        response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read {}: {e}", self.url)))
    }

    fn parse(&self, body: &str) -> Vec<String> {
        let wanted = self.version.map(|v| v.record_type());
        let mut dropped = 0usize;

        let lines = body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| match line.parse::<IpAddr>() {
                Ok(ip) => wanted.is_none_or(|t| t.accepts(&ip)),
                Err(_) => {
                    dropped += 1;
                    tracing::debug!("Dropping invalid line '{}'", line);
                    false
                }
            })
            .map(str::to_string);

        let kept: Vec<String> = match self.limit {
            Some(limit) => lines.take(limit).collect(),
            None => lines.collect(),
        };

        if dropped > 0 {
            tracing::debug!("{}: dropped {} invalid line(s)", self.url, dropped);
        }
        kept
    }
}

#[async_trait::async_trait]
impl IpSource for RawListSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        let body = self
            .retry
            .run("fetch raw list", || self.fetch_body())
            .await?;
        let addresses = self.parse(&body);
        tracing::info!("{} yielded {} address(es)", self.url, addresses.len());
        Ok(addresses)
    }

    fn source_name(&self) -> &'static str {
        "raw-list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    const BODY: &str = "1.1.1.1\n\n  2.2.2.2  \ngarbage\n2606:4700::1\n3.3.3.3\n";

    #[tokio::test]
    async fn version_and_limit_applied_after_validation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v4.txt");
                then.status(200).body(BODY);
            })
            .await;

        let source = RawListSource::new(server.url("/v4.txt"))
            .unwrap()
            .with_version(Some(IpVersion::V4))
            .with_limit(Some(2));

        assert_eq!(source.fetch().await.unwrap(), vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[tokio::test]
    async fn no_version_keeps_both_families() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/all.txt");
                then.status(200).body(BODY);
            })
            .await;

        let source = RawListSource::new(server.url("/all.txt")).unwrap();
        assert_eq!(
            source.fetch().await.unwrap(),
            vec!["1.1.1.1", "2.2.2.2", "2606:4700::1", "3.3.3.3"]
        );
    }

    #[tokio::test]
    async fn server_errors_retried_then_surface() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/down.txt");
                then.status(503);
            })
            .await;

        let source = RawListSource::new(server.url("/down.txt"))
            .unwrap()
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(2),
            ));

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
        mock.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.txt");
                then.status(404);
            })
            .await;

        let source = RawListSource::new(server.url("/missing.txt"))
            .unwrap()
            .with_retry(RetryPolicy::new(
                3,
                Duration::from_millis(1),
                Duration::from_millis(2),
            ));

        assert!(matches!(source.fetch().await, Err(Error::NotFound(_))));
        mock.assert_hits_async(1).await;
    }
}
