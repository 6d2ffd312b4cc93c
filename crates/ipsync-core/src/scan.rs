//! Address scanning for free-form text files
//!
//! Archive sources hand over a directory of extracted files; every `.txt`
//! file under it is scanned line by line for address literals.

use regex::Regex;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::LazyLock;

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 pattern is valid")
});

static IPV6_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:[a-f0-9]{1,4}:){7}[a-f0-9]{1,4}\b").expect("IPv6 pattern is valid")
});

/// Address scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct Scanner {
    include_ipv6: bool,
}

impl Scanner {
    /// IPv4-only scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Also collect full-form (8 group) IPv6 literals
    pub fn with_ipv6(mut self, include_ipv6: bool) -> Self {
        self.include_ipv6 = include_ipv6;
        self
    }

    /// Scan one line, returning every valid address in it
    pub fn scan_line(&self, line: &str) -> Vec<IpAddr> {
        let mut found: Vec<IpAddr> = IPV4_PATTERN
            .find_iter(line)
            .filter_map(|m| parse_ipv4_octets(m.as_str()))
            .map(IpAddr::V4)
            .collect();

        if self.include_ipv6 {
            found.extend(
                IPV6_PATTERN
                    .find_iter(line)
                    .filter_map(|m| m.as_str().parse::<Ipv6Addr>().ok())
                    .map(IpAddr::V6),
            );
        }

        found
    }

    /// Scan a block of text into a set
    pub fn scan_text(&self, text: &str, into: &mut BTreeSet<IpAddr>) {
        for line in text.lines() {
            into.extend(self.scan_line(line));
        }
    }

    /// Recursively scan every `.txt` file under `dir`
    ///
    /// Unreadable files are logged and skipped.
    pub fn scan_dir(&self, dir: &Path) -> std::io::Result<BTreeSet<IpAddr>> {
        let mut found = BTreeSet::new();
        let mut pending = vec![dir.to_path_buf()];
        let mut files = 0usize;

        while let Some(current) = pending.pop() {
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                    continue;
                }
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        files += 1;
                        self.scan_text(&String::from_utf8_lossy(&bytes), &mut found);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
                    }
                }
            }
        }

        tracing::debug!(
            "Scanned {} text file(s) under {}: {} unique address(es)",
            files,
            dir.display(),
            found.len()
        );
        Ok(found)
    }
}

/// Validate a dotted quad, each octet in [0, 255]
fn parse_ipv4_octets(literal: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = literal.split('.');
    for octet in &mut octets {
        *octet = parts.next()?.parse::<u8>().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_addresses_inside_noise() {
        let scanner = Scanner::new();
        let found = scanner.scan_line("1.2.3.4:443#HK, backup 10.0.0.1 and 999.1.1.1");
        assert_eq!(
            found,
            vec![
                "1.2.3.4".parse::<IpAddr>().unwrap(),
                "10.0.0.1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn ipv6_only_when_enabled() {
        let line = "2001:0db8:0000:0000:0000:ff00:0042:8329 8.8.8.8";
        assert_eq!(Scanner::new().scan_line(line).len(), 1);
        assert_eq!(Scanner::new().with_ipv6(true).scan_line(line).len(), 2);
    }

    #[test]
    fn octets_are_range_checked() {
        assert!(parse_ipv4_octets("255.255.255.255").is_some());
        assert!(parse_ipv4_octets("256.1.1.1").is_none());
        assert!(parse_ipv4_octets("1.2.3").is_none());
    }

    #[test]
    fn scans_nested_txt_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "1.1.1.1\n8.8.8.8\n").unwrap();
        std::fs::write(dir.path().join("nested/b.txt"), "8.8.8.8\n9.9.9.9\n").unwrap();
        std::fs::write(dir.path().join("ignored.csv"), "4.4.4.4\n").unwrap();

        let found = Scanner::new().scan_dir(dir.path()).unwrap();
        let found: Vec<String> = found.iter().map(|ip| ip.to_string()).collect();
        assert_eq!(found, vec!["1.1.1.1", "8.8.8.8", "9.9.9.9"]);
    }
}
