//! IP database merge pipeline
//!
//! `source → filter → union with local file → persist → publish`
//!
//! The local file is authoritative: it is written before publishing, so a
//! failed publish leaves an up-to-date local copy and the next run pushes it.

pub mod file;

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::filter::IpFilter;
use crate::traits::{ContentStore, ContentUpdate, IpSource};

pub use file::MergedIpFile;

/// Timestamp format for the file header and commit message
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of a merge run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Addresses in the written file
    pub total: usize,
    /// Valid addresses the source produced
    pub scanned: usize,
    /// Addresses not present in the previous file
    pub added: usize,
    /// Whether the remote copy was updated
    pub published: bool,
    /// Timestamp written into the header
    pub updated: String,
}

/// Merge pipeline
pub struct MergePipeline {
    config: MergeConfig,
    file: MergedIpFile,
    filter: IpFilter,
    store: Option<Arc<dyn ContentStore>>,
}

impl MergePipeline {
    /// Create a pipeline that only maintains the local file
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;
        let filter = IpFilter::from_cidrs(&config.exclusions)?;
        Ok(Self {
            file: MergedIpFile::new(&config.output_path),
            config,
            filter,
            store: None,
        })
    }

    /// Also publish the result to `store`
    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn file(&self) -> &MergedIpFile {
        &self.file
    }

    /// Current time in the configured offset
    pub fn now(&self) -> Result<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.config.utc_offset_hours * 3600).ok_or_else(|| {
            Error::config(format!(
                "Invalid UTC offset: {} hours",
                self.config.utc_offset_hours
            ))
        })?;
        Ok(Utc::now().with_timezone(&offset))
    }

    /// Run the pipeline now
    pub async fn run(&self, source: &dyn IpSource) -> Result<MergeReport> {
        let now = self.now()?;
        self.run_at(source, now).await
    }

    /// Run the pipeline with a fixed timestamp
    pub async fn run_at(
        &self,
        source: &dyn IpSource,
        now: DateTime<FixedOffset>,
    ) -> Result<MergeReport> {
        let updated = now.format(TIMESTAMP_FORMAT).to_string();

        let scanned = self.filter.apply(&source.fetch().await?);
        info!(
            "{} produced {} valid address(es)",
            source.source_name(),
            scanned.len()
        );

        let mut merged = self.file.load().await?;
        let added = scanned.iter().filter(|ip| !merged.contains(ip)).count();
        merged.extend(scanned.iter().copied());

        // Exclusions also apply to addresses carried over from the old file
        merged.retain(|ip| !self.filter.is_excluded(ip));

        let content = self.file.write(&merged, &updated).await?;
        debug!("Merged list: {} total, {} new", merged.len(), added);

        let published = match &self.store {
            Some(store) => {
                self.publish(store.as_ref(), content, merged.len(), &updated)
                    .await?;
                true
            }
            None => false,
        };

        Ok(MergeReport {
            total: merged.len(),
            scanned: scanned.len(),
            added,
            published,
            updated,
        })
    }

    async fn publish(
        &self,
        store: &dyn ContentStore,
        content: String,
        total: usize,
        updated: &str,
    ) -> Result<()> {
        let path = self.config.remote_path.as_str();
        let revision = store.revision(path).await?;
        match &revision {
            Some(rev) => debug!("Remote {} is at revision {}", path, rev),
            None => info!("Remote {} does not exist yet; creating it", path),
        }

        let update = ContentUpdate {
            path: path.to_string(),
            content,
            message: commit_message(path, updated, total),
            revision,
        };
        store.publish(&update).await?;

        info!("Published {} to {} ({} addresses)", path, store.store_name(), total);
        Ok(())
    }
}

/// Commit message for a published list
pub fn commit_message(path: &str, updated: &str, total: usize) -> String {
    format!("Update {path} - {updated} (Total IPs: {total})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_message_format() {
        assert_eq!(
            commit_message("ip.txt", "2025-01-09 20:00:00", 2),
            "Update ip.txt - 2025-01-09 20:00:00 (Total IPs: 2)"
        );
    }

    #[test]
    fn now_uses_configured_offset() {
        let pipeline = MergePipeline::new(MergeConfig::default()).unwrap();
        let now = pipeline.now().unwrap();
        assert_eq!(now.offset().local_minus_utc(), 8 * 3600);
    }
}
