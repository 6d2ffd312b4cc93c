//! Batch geolocation over the ip-api.com batch endpoint

use ipsync_core::geo::MAX_GEO_BATCH;
use ipsync_core::traits::{GeoAnswer, Geolocator};
use ipsync_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct Query<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Answer {
    query: String,
    #[serde(default)]
    country_code: Option<String>,
}

/// Geolocator for `POST /batch` with `[{"query": ip}, ...]`
pub struct IpApiGeolocator {
    endpoint: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for IpApiGeolocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpApiGeolocator")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl IpApiGeolocator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: crate::http_client()?,
        })
    }
}

#[async_trait::async_trait]
impl Geolocator for IpApiGeolocator {
    async fn locate(&self, batch: &[String]) -> Result<Vec<GeoAnswer>> {
        if batch.len() > MAX_GEO_BATCH {
            return Err(Error::invalid_input(format!(
                "Geolocation batch of {} exceeds the limit of {}",
                batch.len(),
                MAX_GEO_BATCH
            )));
        }

        let body: Vec<Query<'_>> = batch.iter().map(|ip| Query { query: ip }).collect();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::http(format!("Geolocation request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status("ip-api", status.as_u16(), "batch lookup", &text));
        }

        let answers: Vec<Answer> = response
            .json()
            .await
            .map_err(|e| Error::provider("ip-api", format!("Invalid batch response: {e}")))?;

        Ok(answers
            .into_iter()
            .map(|a| GeoAnswer::new(a.query, a.country_code))
            .collect())
    }

    fn max_batch(&self) -> usize {
        MAX_GEO_BATCH
    }

    fn geolocator_name(&self) -> &'static str {
        "ip-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn posts_batch_and_reads_country_codes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/batch")
                    .json_body(json!([{"query": "1.1.1.1"}, {"query": "10.0.0.1"}]));
                then.status(200).json_body(json!([
                    {"query": "1.1.1.1", "status": "success", "countryCode": "AU"},
                    {"query": "10.0.0.1", "status": "fail", "message": "private range"},
                ]));
            })
            .await;

        let geo = IpApiGeolocator::new(server.url("/batch")).unwrap();
        let answers = geo
            .locate(&["1.1.1.1".to_string(), "10.0.0.1".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(answers[0], GeoAnswer::new("1.1.1.1", Some("AU".into())));
        assert_eq!(answers[1].country_code, None);
    }

    #[tokio::test]
    async fn oversized_batch_rejected_locally() {
        let geo = IpApiGeolocator::new("http://127.0.0.1:9/batch").unwrap();
        let batch: Vec<String> = (0..100).map(|i| format!("10.0.0.{i}")).collect();
        assert!(matches!(geo.locate(&batch).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/batch");
                then.status(429);
            })
            .await;

        let geo = IpApiGeolocator::new(server.url("/batch")).unwrap();
        let err = geo.locate(&["1.1.1.1".to_string()]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
