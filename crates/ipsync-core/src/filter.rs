//! Candidate filtering
//!
//! Raw candidates from any source pass through [`IpFilter`] before they are
//! published: literals are validated, collapsed through a set, restricted to
//! one address family, and stripped of excluded networks.

use ipnetwork::IpNetwork;
use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::traits::RecordType;

/// Cloudflare's published IPv4 edge ranges
///
/// Used to keep records pointing at origin addresses rather than the
/// provider's own anycast network.
pub const CLOUDFLARE_IPV4_RANGES: &[&str] = &[
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "103.31.4.0/22",
    "141.101.64.0/18",
    "108.162.192.0/18",
    "190.93.240.0/20",
    "188.114.96.0/20",
    "197.234.240.0/22",
    "198.41.128.0/17",
    "162.158.0.0/15",
    "104.16.0.0/13",
    "104.24.0.0/14",
    "172.64.0.0/13",
    "131.0.72.0/22",
];

/// Parse CIDR strings into networks
pub fn parse_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Vec<IpNetwork>> {
    cidrs
        .iter()
        .map(|cidr| {
            let cidr = cidr.as_ref().trim();
            cidr.parse::<IpNetwork>()
                .map_err(|e| Error::config(format!("Invalid CIDR range '{cidr}': {e}")))
        })
        .collect()
}

/// Validating, deduplicating, excluding filter
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    exclusions: Vec<IpNetwork>,
    family: Option<RecordType>,
}

impl IpFilter {
    /// Filter that only validates and deduplicates
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from CIDR strings
    pub fn from_cidrs<S: AsRef<str>>(cidrs: &[S]) -> Result<Self> {
        Ok(Self {
            exclusions: parse_cidrs(cidrs)?,
            family: None,
        })
    }

    /// Keep only addresses a record of `record_type` can hold
    pub fn with_family(mut self, record_type: RecordType) -> Self {
        self.family = Some(record_type);
        self
    }

    /// Whether `ip` lies in any excluded network
    pub fn is_excluded(&self, ip: &IpAddr) -> bool {
        self.exclusions.iter().any(|net| net.contains(*ip))
    }

    /// Apply the filter
    ///
    /// The result is sorted by numeric address value, which also makes
    /// repeated runs over the same input produce the same output.
    pub fn apply<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<IpAddr> {
        let mut kept = BTreeSet::new();
        let mut invalid = 0usize;
        let mut excluded = 0usize;

        for candidate in candidates {
            let raw = candidate.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let Ok(ip) = raw.parse::<IpAddr>() else {
                invalid += 1;
                tracing::debug!("Dropping invalid address literal '{}'", raw);
                continue;
            };
            if let Some(family) = self.family
                && !family.accepts(&ip)
            {
                continue;
            }
            if self.is_excluded(&ip) {
                excluded += 1;
                continue;
            }
            kept.insert(ip);
        }

        if invalid > 0 || excluded > 0 {
            tracing::debug!(
                "Filter kept {} address(es), dropped {} invalid and {} excluded",
                kept.len(),
                invalid,
                excluded
            );
        }

        kept.into_iter().collect()
    }
}

/// Sort address literals numerically, dropping duplicates and invalid entries
///
/// IPv4 addresses sort before IPv6 addresses.
pub fn sort_numeric<S: AsRef<str>>(addresses: &[S]) -> Vec<String> {
    IpFilter::new()
        .apply(addresses)
        .into_iter()
        .map(|ip| ip.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let out = IpFilter::new().apply(&["1.2.3.4", "1.2.3.4", " 5.6.7.8 "]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn sorts_numerically_not_lexicographically() {
        assert_eq!(
            sort_numeric(&["10.0.0.1", "2.0.0.1", "192.168.0.1"]),
            vec!["2.0.0.1", "10.0.0.1", "192.168.0.1"]
        );
    }

    #[test]
    fn excluded_networks_are_dropped() {
        let filter = IpFilter::from_cidrs(CLOUDFLARE_IPV4_RANGES).unwrap();
        let out = filter.apply(&["104.16.1.1", "172.67.0.1", "8.8.8.8"]);
        assert_eq!(out, vec!["8.8.8.8".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn invalid_literals_and_other_family_dropped() {
        let filter = IpFilter::new().with_family(RecordType::A);
        let out = filter.apply(&["256.1.1.1", "not-an-ip", "2606:4700::1", "", "9.9.9.9"]);
        assert_eq!(out, vec!["9.9.9.9".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn bad_cidr_is_a_config_error() {
        assert!(matches!(
            IpFilter::from_cidrs(&["10.0.0.0/33"]),
            Err(Error::Config(_))
        ));
    }
}
