// # IP Source Trait
//
// Defines the interface for discovering candidate addresses.
//
// ## Implementations
//
// - DNS-over-HTTPS, raw text lists, ZIP archives: `ipsync-ip-http` crate
// - [`StaticSource`]: a fixed list (tests, pre-computed buckets)
// - [`MultiSource`]: concatenation of several sources
//
// ## Usage
//
// ```rust,ignore
// use ipsync_core::IpSource;
//
// let source = /* IpSource implementation */;
// let candidates = source.fetch().await?;
// ```
//
// A source returns raw literals exactly as discovered. Deduplication,
// validation and exclusion are owned by `IpFilter`, not by sources.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for candidate address sources
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Failure semantics
///
/// Whether a failure is fatal is decided per source kind:
/// - A DNS-over-HTTPS lookup that fails yields an empty list (logged)
/// - A raw list or archive that cannot be fetched returns `Err`
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Fetch the current candidate addresses
    async fn fetch(&self) -> Result<Vec<String>>;

    /// Short name for logging (e.g., "doh", "raw-list", "archive")
    fn source_name(&self) -> &'static str;
}

/// Source returning a fixed list of addresses
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    addresses: Vec<String>,
}

impl StaticSource {
    /// Create a source that always yields `addresses`
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl IpSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        Ok(self.addresses.clone())
    }

    fn source_name(&self) -> &'static str {
        "static"
    }
}

/// Source concatenating the output of several sources in order
///
/// The first failing member aborts the fetch.
pub struct MultiSource {
    sources: Vec<Box<dyn IpSource>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn IpSource>>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl IpSource for MultiSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        for source in &self.sources {
            let found = source.fetch().await?;
            tracing::debug!("{} source yielded {} address(es)", source.source_name(), found.len());
            all.extend(found);
        }
        Ok(all)
    }

    fn source_name(&self) -> &'static str {
        "multi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct Broken;

    #[async_trait]
    impl IpSource for Broken {
        async fn fetch(&self) -> Result<Vec<String>> {
            Err(Error::ip_source("unreachable"))
        }

        fn source_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn multi_source_concatenates_in_order() {
        let multi = MultiSource::new(vec![
            Box::new(StaticSource::new(["1.1.1.1", "2.2.2.2"])),
            Box::new(StaticSource::new(["1.1.1.1"])),
        ]);
        assert_eq!(
            multi.fetch().await.unwrap(),
            vec!["1.1.1.1", "2.2.2.2", "1.1.1.1"]
        );
    }

    #[tokio::test]
    async fn multi_source_propagates_failure() {
        let multi = MultiSource::new(vec![
            Box::new(StaticSource::new(["1.1.1.1"])),
            Box::new(Broken),
        ]);
        assert!(multi.fetch().await.is_err());
    }
}
