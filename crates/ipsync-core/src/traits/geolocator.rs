//! Geolocation trait
//!
//! Batch lookups of country codes for addresses. Batch size ceilings and
//! concurrency are enforced by the caller (`geo::bucket_by_country`).

use async_trait::async_trait;

/// One answer from a geolocation batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoAnswer {
    /// The address that was queried
    pub query: String,
    /// ISO country code, if the service resolved one
    pub country_code: Option<String>,
}

impl GeoAnswer {
    pub fn new(query: impl Into<String>, country_code: Option<String>) -> Self {
        Self {
            query: query.into(),
            country_code,
        }
    }
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Resolve one batch of addresses
    ///
    /// Answers may come back in any order and may omit addresses.
    async fn locate(&self, batch: &[String]) -> Result<Vec<GeoAnswer>, crate::Error>;

    /// Largest batch the service accepts
    fn max_batch(&self) -> usize;

    /// Get the geolocator name (for logging)
    fn geolocator_name(&self) -> &'static str;
}
