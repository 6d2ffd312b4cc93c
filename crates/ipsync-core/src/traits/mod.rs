//! Core traits for ipsync
//!
//! This module defines the abstract interfaces that all integrations implement.
//!
//! - [`IpSource`]: Produce candidate addresses from an external source
//! - [`DnsRecordClient`]: List, delete and create records in a DNS zone
//! - [`Geolocator`]: Resolve addresses to country codes in batches
//! - [`ContentStore`]: Publish a text file to a revisioned remote store
//! - [`Notifier`]: Deliver human-readable run summaries

pub mod ip_source;
pub mod dns_client;
pub mod geolocator;
pub mod content_store;
pub mod notifier;

pub use ip_source::{IpSource, MultiSource, StaticSource};
pub use dns_client::{DnsRecord, DnsRecordClient, NewRecord, RecordQuery, RecordType};
pub use geolocator::{GeoAnswer, Geolocator};
pub use content_store::{ContentStore, ContentUpdate};
pub use notifier::Notifier;
