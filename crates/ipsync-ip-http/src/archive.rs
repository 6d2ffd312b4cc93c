//! ZIP archive source with mirror fallback

use ipsync_core::scan::Scanner;
use ipsync_core::traits::IpSource;
use ipsync_core::{Error, Result};
use std::io::Cursor;
use std::net::IpAddr;

/// Downloads a ZIP of text lists and scans it for addresses
///
/// Mirrors are tried in order and the first successful download wins. When
/// every mirror fails the fetch is an error.
pub struct ArchiveSource {
    urls: Vec<String>,
    scanner: Scanner,
    client: reqwest::Client,
}

impl ArchiveSource {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("Archive source needs at least one URL"));
        }
        Ok(Self {
            urls,
            scanner: Scanner::new(),
            client: crate::http_client()?,
        })
    }

    /// Also collect full-form IPv6 literals
    pub fn with_ipv6(mut self, include_ipv6: bool) -> Self {
        self.scanner = self.scanner.with_ipv6(include_ipv6);
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Download of {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status("archive", status.as_u16(), "download", url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Download from the first mirror that answers
    async fn download_any(&self) -> Result<(String, Vec<u8>)> {
        let mut failures = Vec::with_capacity(self.urls.len());
        for url in &self.urls {
            match self.download(url).await {
                Ok(bytes) => {
                    tracing::info!("Downloaded {} byte(s) from {}", bytes.len(), url);
                    return Ok((url.clone(), bytes));
                }
                Err(e) => {
                    tracing::warn!("Mirror {} failed: {}", url, e);
                    failures.push(e.to_string());
                }
            }
        }
        Err(Error::ip_source(format!(
            "All {} archive mirror(s) failed: {}",
            self.urls.len(),
            failures.join("; ")
        )))
    }
}

/// Extract `bytes` into a scratch directory and scan every text file
///
/// The scratch directory is removed when this returns.
pub fn scan_archive(bytes: Vec<u8>, scanner: Scanner) -> Result<Vec<IpAddr>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::ip_source(format!("Invalid ZIP archive: {e}")))?;

    let scratch = tempfile::tempdir()?;
    archive
        .extract(scratch.path())
        .map_err(|e| Error::ip_source(format!("Failed to extract archive: {e}")))?;

    let found = scanner.scan_dir(scratch.path())?;
    Ok(found.into_iter().collect())
}

#[async_trait::async_trait]
impl IpSource for ArchiveSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        let (url, bytes) = self.download_any().await?;
        let scanner = self.scanner;

        let found = tokio::task::spawn_blocking(move || scan_archive(bytes, scanner))
            .await
            .map_err(|e| Error::Other(format!("Archive scan task failed: {e}")))??;

        tracing::info!("{} contained {} unique address(es)", url, found.len());
        Ok(found.iter().map(IpAddr::to_string).collect())
    }

    fn source_name(&self) -> &'static str {
        "archive"
    }
}
