// # Content Store Trait
//
// Defines the interface for publishing a text file to a remote store that
// guards updates with a revision marker (e.g. a blob SHA).
//
// ## Implementations
//
// - GitHub contents API: `ipsync-publish-github` crate
//
// ## Update protocol
//
// 1. `revision(path)` immediately before writing
// 2. `publish(update)` carrying that revision
//
// A missing revision means the file does not exist yet and is created.

use async_trait::async_trait;

/// One publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUpdate {
    /// Path of the file in the remote store
    pub path: String,
    /// Full new content (plain text; the store handles any encoding)
    pub content: String,
    /// Commit / change message
    pub message: String,
    /// Current revision marker of the remote file, if it exists
    pub revision: Option<String>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch the current revision marker of `path`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(rev))`: the file exists at revision `rev`
    /// - `Ok(None)`: the file does not exist
    /// - `Err(Error)`: the lookup failed
    async fn revision(&self, path: &str) -> Result<Option<String>, crate::Error>;

    /// Write the content, keyed by the revision in `update`
    async fn publish(&self, update: &ContentUpdate) -> Result<(), crate::Error>;

    /// Store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
