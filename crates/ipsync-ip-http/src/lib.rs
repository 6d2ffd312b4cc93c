// # HTTP IP Sources
//
// This crate provides the HTTP-backed integrations that feed candidates
// into the reconciler and the merge pipeline.
//
// ## Sources
//
// - [`DohSource`]: DNS-over-HTTPS JSON lookups of one or more domains
// - [`RawListSource`]: plain-text list, one address per line
// - [`ArchiveSource`]: ZIP archive of text files with mirror fallback
//
// ## Geolocation
//
// - [`IpApiGeolocator`]: batch country lookups
//
// ## Failure Semantics
//
// Sources make one attempt per call unless a retry policy is attached. A
// failed DoH lookup of one domain yields no addresses for that domain; a
// raw list or an archive that cannot be fetched is an error.

mod archive;
mod doh;
mod geo;
mod raw;

pub use archive::ArchiveSource;
pub use doh::DohSource;
pub use geo::IpApiGeolocator;
pub use raw::RawListSource;

use ipsync_core::config::SourceConfig;
use ipsync_core::retry::RetryPolicy;
use ipsync_core::traits::{IpSource, MultiSource};
use ipsync_core::{Error, Result};
use std::time::Duration;

/// Default HTTP timeout for source requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every request
const USER_AGENT: &str = concat!("ipsync/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))
}

/// Build a source from its configuration
///
/// `retry` is attached to raw-list sources; archive sources fall back
/// across mirrors instead, and DoH lookups degrade to an empty answer.
pub fn build_source(config: &SourceConfig, retry: &RetryPolicy) -> Result<Box<dyn IpSource>> {
    config.validate()?;

    let source: Box<dyn IpSource> = match config {
        SourceConfig::Doh {
            resolver,
            domains,
            record_type,
        } => Box::new(
            DohSource::new(resolver.clone(), domains.clone())?.with_record_type(*record_type),
        ),
        SourceConfig::RawList {
            url,
            version,
            limit,
        } => Box::new(
            RawListSource::new(url.clone())?
                .with_version(*version)
                .with_limit(*limit)
                .with_retry(retry.clone()),
        ),
        SourceConfig::Archive { urls, include_ipv6 } => {
            Box::new(ArchiveSource::new(urls.clone())?.with_ipv6(*include_ipv6))
        }
        SourceConfig::Multi { sources } => Box::new(MultiSource::new(
            sources
                .iter()
                .map(|s| build_source(s, retry))
                .collect::<Result<Vec<_>>>()?,
        )),
    };

    tracing::debug!("Built {} source", source.source_name());
    Ok(source)
}
