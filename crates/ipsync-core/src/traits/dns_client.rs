// # DNS Record Client Trait
//
// Defines the interface for reading and mutating records in one DNS zone.
//
// ## Implementations
//
// - Cloudflare: `ipsync-provider-cloudflare` crate
//
// ## Trust Level: Untrusted
//
// Clients execute exactly one logical API operation per call:
// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
// - ✅ Parse provider-specific responses
// - ❌ Retry, back off, or decide whether a failure is fatal (owned by `Reconciler`)
// - ❌ Filter records by name policy (owned by `Reconciler`)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// DNS record type managed by ipsync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    #[default]
    #[serde(rename = "A")]
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// DNS RR type code (1 for A, 28 for AAAA)
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Aaaa => 28,
        }
    }

    /// Whether `ip` belongs to the family this record type holds
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (RecordType::A, IpAddr::V4(_)) | (RecordType::Aaaa, IpAddr::V6(_))
        )
    }

    /// Record type for an address
    pub fn for_ip(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(crate::Error::invalid_input(format!(
                "unsupported record type '{other}' (expected A or AAAA)"
            ))),
        }
    }
}

/// A record as stored by the remote DNS provider
///
/// Only ever held transiently: listed, then deleted or left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    /// Provider-assigned record id
    pub id: String,
    /// Record type as reported by the provider (may be other than A/AAAA)
    #[serde(rename = "type")]
    pub record_type: String,
    /// Fully-qualified record name
    pub name: String,
    /// Record content (the address for A/AAAA)
    pub content: String,
    /// TTL in seconds (1 = automatic)
    #[serde(default)]
    pub ttl: u32,
    /// Whether the provider proxies traffic for this record
    #[serde(default)]
    pub proxied: bool,
}

/// Payload for creating a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl NewRecord {
    /// Unproxied address record for `ip`
    pub fn address(name: impl Into<String>, ip: IpAddr, ttl: u32) -> Self {
        Self {
            record_type: RecordType::for_ip(&ip),
            name: name.into(),
            content: ip.to_string(),
            ttl,
            proxied: false,
        }
    }
}

/// Query-level filters for listing records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Exact record name filter
    pub name: Option<String>,
    /// Record type filter
    pub record_type: Option<RecordType>,
}

impl RecordQuery {
    /// Query for every record in the zone
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }
}

/// Trait for DNS record clients scoped to one zone
///
/// # Thread Safety
///
/// Implementations must be usable from several concurrent tasks: the
/// reconciler fans deletes and creates out over a bounded task group.
#[async_trait]
pub trait DnsRecordClient: Send + Sync {
    /// List records, optionally filtered at the query level
    ///
    /// Implementations return every page of results.
    async fn list(&self, query: &RecordQuery) -> Result<Vec<DnsRecord>, crate::Error>;

    /// Delete a record by id
    async fn delete(&self, record_id: &str) -> Result<(), crate::Error>;

    /// Create a record, returning it as stored by the provider
    async fn create(&self, record: &NewRecord) -> Result<DnsRecord, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_wire_names() {
        assert_eq!(serde_json::to_string(&RecordType::A).unwrap(), "\"A\"");
        assert_eq!(serde_json::to_string(&RecordType::Aaaa).unwrap(), "\"AAAA\"");
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
        assert!("CNAME".parse::<RecordType>().is_err());
    }

    #[test]
    fn new_record_payload_shape() {
        let record = NewRecord::address("edge.example.com", "1.2.3.4".parse().unwrap(), 60);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "A",
                "name": "edge.example.com",
                "content": "1.2.3.4",
                "ttl": 60,
                "proxied": false,
            })
        );
    }

    #[test]
    fn record_type_accepts_family() {
        let v4: IpAddr = "1.2.3.4".parse().unwrap();
        let v6: IpAddr = "2606:4700::1".parse().unwrap();
        assert!(RecordType::A.accepts(&v4));
        assert!(!RecordType::A.accepts(&v6));
        assert!(RecordType::Aaaa.accepts(&v6));
        assert_eq!(RecordType::for_ip(&v6), RecordType::Aaaa);
    }
}
