// # ipsync-core
//
// Core library for keeping DNS zones in sync with discovered edge addresses.
//
// ## Architecture Overview
//
// - **IpSource**: Trait for discovering candidate addresses
// - **IpFilter**: Validation, deduplication, family and CIDR exclusion
// - **DnsRecordClient**: Trait for listing, deleting and creating zone records
// - **Reconciler**: State machine making a name's records equal a candidate set
// - **GeoFanout**: Country buckets reconciled as `<cc>.<domain>`
// - **MergePipeline**: Merged IP list file, persisted and published
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from HTTP integrations
// 2. **Explicit Results**: Every network call returns a `Result`; the
//    orchestration layer applies retry and failure policy
// 3. **Phased Concurrency**: Work within a phase is bounded and joined before
//    the next phase starts
// 4. **Library-First**: The binary only wires configuration to these types

pub mod traits;
pub mod engine;
pub mod geo;
pub mod merge;
pub mod filter;
pub mod retry;
pub mod task_group;
pub mod scan;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{
    ContentStore, ContentUpdate, DnsRecord, DnsRecordClient, GeoAnswer, Geolocator, IpSource,
    MultiSource, NewRecord, Notifier, RecordQuery, RecordType, StaticSource,
};
pub use engine::{Phase, ReconcileEvent, ReconcileReport, Reconciler};
pub use geo::{GeoFanout, GeoReport};
pub use merge::{MergePipeline, MergeReport, MergedIpFile};
pub use filter::IpFilter;
pub use retry::RetryPolicy;
pub use task_group::TaskGroup;
pub use scan::Scanner;
pub use config::{
    FailurePolicy, GeoConfig, IpVersion, MergeConfig, NameMatch, NotifierConfig,
    PublisherConfig, ReconcileConfig, RetryConfig, SourceConfig, ZoneContext,
};
pub use error::{Error, Result};
