// # Merged IP File
//
// The local authoritative address list.
//
// ## File Format
//
// ```text
// # Updated: 2025-01-09 20:00:00
// # Total IPs: 2
//
// 1.1.1.1
// 8.8.8.8
// ```
//
// ## Crash Safety
//
// The file is always rewritten in full: content goes to a `.tmp` sibling
// first, then is renamed over the real path, so readers never observe a
// half-written list.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;

/// Header prefix of the update timestamp line
pub const UPDATED_PREFIX: &str = "# Updated: ";

/// Header prefix of the count line
pub const TOTAL_PREFIX: &str = "# Total IPs: ";

/// On-disk merged address list
#[derive(Debug, Clone)]
pub struct MergedIpFile {
    path: PathBuf,
}

impl MergedIpFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previously persisted addresses
    ///
    /// A missing file is an empty list. Comment lines (`#`) and blank lines
    /// are skipped; lines that are not address literals are dropped.
    pub async fn load(&self) -> Result<BTreeSet<IpAddr>, Error> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No existing list at {}", self.path.display());
                return Ok(BTreeSet::new());
            }
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let addresses = parse_body(&content);
        tracing::debug!(
            "Loaded {} address(es) from {}",
            addresses.len(),
            self.path.display()
        );
        Ok(addresses)
    }

    /// Render and atomically write the list, returning the written text
    pub async fn write(
        &self,
        addresses: &BTreeSet<IpAddr>,
        updated: &str,
    ) -> Result<String, Error> {
        let content = render(addresses, updated);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(content.as_bytes()).await.map_err(|e| {
                Error::storage(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::storage(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::storage(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::info!(
            "Wrote {} address(es) to {}",
            addresses.len(),
            self.path.display()
        );
        Ok(content)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

/// Parse a list body, skipping comments and blank lines
pub fn parse_body(content: &str) -> BTreeSet<IpAddr> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.parse::<IpAddr>().ok())
        .collect()
}

/// Render the header and the addresses in numeric order
///
/// `BTreeSet<IpAddr>` iterates IPv4 before IPv6, each family by value.
pub fn render(addresses: &BTreeSet<IpAddr>, updated: &str) -> String {
    let mut out = format!(
        "{UPDATED_PREFIX}{updated}\n{TOTAL_PREFIX}{}\n\n",
        addresses.len()
    );
    for ip in addresses {
        out.push_str(&ip.to_string());
        out.push('\n');
    }
    out
}
