//! Configuration types for ipsync
//!
//! Every component receives its configuration explicitly; nothing in the
//! library reads the environment. The `ipsyncd` binary builds these structs
//! once at start-up.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::traits::RecordType;

/// Credential/scope pair for one DNS zone
#[derive(Clone, Serialize, Deserialize)]
pub struct ZoneContext {
    /// Opaque zone id
    pub zone_id: String,

    /// API token with DNS edit permission for the zone
    /// ⚠️ NEVER log this value
    pub api_token: String,

    /// Zone apex (e.g. "example.com"), used to qualify short record names
    #[serde(default)]
    pub zone_name: Option<String>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for ZoneContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneContext")
            .field("zone_id", &self.zone_id)
            .field("api_token", &"<REDACTED>")
            .field("zone_name", &self.zone_name)
            .finish()
    }
}

impl ZoneContext {
    pub fn new(zone_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            api_token: api_token.into(),
            zone_name: None,
        }
    }

    pub fn with_zone_name(mut self, zone_name: impl Into<String>) -> Self {
        self.zone_name = Some(zone_name.into());
        self
    }

    /// Validate the zone context
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.zone_id.trim().is_empty() {
            return Err(crate::Error::config("Zone id cannot be empty"));
        }
        if self.api_token.trim().is_empty() {
            return Err(crate::Error::config("API token cannot be empty"));
        }
        Ok(())
    }

    /// Qualify a record name against the zone apex
    ///
    /// - `@` maps to the apex
    /// - a name already ending in the apex is returned unchanged
    /// - any other name becomes `<name>.<apex>`
    ///
    /// Without a known apex the name is returned unchanged.
    pub fn qualify(&self, name: &str) -> String {
        let Some(apex) = self.zone_name.as_deref() else {
            return name.to_string();
        };
        if name == "@" || name == apex {
            return apex.to_string();
        }
        if name.ends_with(&format!(".{apex}")) {
            return name.to_string();
        }
        format!("{name}.{apex}")
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first (1 disables retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay (in milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Retry max_attempts must be >= 1"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(crate::Error::config(
                "Retry initial_delay_ms cannot exceed max_delay_ms",
            ));
        }
        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// How existing record names are matched against the target name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatch {
    /// Record name equals the target name
    #[default]
    Exact,
    /// Record name contains the target name as a literal substring
    ///
    /// Opt-in only: "cf" matches "0101cf-test.example.com" too.
    Contains,
    /// Every record of the configured type, whatever its name
    Any,
}

impl NameMatch {
    /// Whether `record_name` is covered by `target` under this policy
    ///
    /// Comparison is ASCII case-insensitive, as DNS names are.
    pub fn matches(&self, target: &str, record_name: &str) -> bool {
        match self {
            NameMatch::Exact => record_name.eq_ignore_ascii_case(target),
            NameMatch::Contains => record_name
                .to_ascii_lowercase()
                .contains(&target.to_ascii_lowercase()),
            NameMatch::Any => true,
        }
    }
}

impl std::str::FromStr for NameMatch {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(NameMatch::Exact),
            "contains" => Ok(NameMatch::Contains),
            "any" => Ok(NameMatch::Any),
            other => Err(crate::Error::config(format!(
                "Unknown name match policy '{other}' (expected exact, contains or any)"
            ))),
        }
    }
}

/// What the reconciler does when a per-record call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole run on the first failure
    Abort,
    /// Log the failure and carry on with the remaining records
    #[default]
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(crate::Error::config(format!(
                "Unknown failure policy '{other}' (expected abort or continue)"
            ))),
        }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Target record name (already qualified against the zone)
    pub record_name: String,

    /// Record type to manage
    #[serde(default)]
    pub record_type: RecordType,

    /// TTL for created records (1 = automatic)
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Name matching policy for the delete phase
    #[serde(default)]
    pub name_match: NameMatch,

    /// CIDR ranges whose addresses are never published
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Policy for failed deletes
    #[serde(default)]
    pub on_delete_failure: FailurePolicy,

    /// Policy for failed creates
    #[serde(default)]
    pub on_create_failure: FailurePolicy,

    /// Maximum concurrent API calls within a phase
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry policy for listing
    #[serde(default)]
    pub retry: RetryConfig,

    /// Capacity of the reconcile event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcileConfig {
    /// Create a configuration for `record_name` with defaults
    pub fn new(record_name: impl Into<String>) -> Self {
        Self {
            record_name: record_name.into(),
            record_type: RecordType::A,
            ttl: default_ttl(),
            name_match: NameMatch::Exact,
            exclusions: Vec::new(),
            on_delete_failure: FailurePolicy::Continue,
            on_create_failure: FailurePolicy::Continue,
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = record_type;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_name_match(mut self, name_match: NameMatch) -> Self {
        self.name_match = name_match;
        self
    }

    pub fn with_exclusions<I, S>(mut self, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = cidrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_failure_policies(
        mut self,
        on_delete: FailurePolicy,
        on_create: FailurePolicy,
    ) -> Self {
        self.on_delete_failure = on_delete;
        self.on_create_failure = on_create;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.record_name.trim().is_empty() && self.name_match != NameMatch::Any {
            return Err(crate::Error::config("Record name cannot be empty"));
        }
        if self.ttl == 0 {
            return Err(crate::Error::config("TTL must be >= 1 (1 = automatic)"));
        }
        if self.concurrency == 0 {
            return Err(crate::Error::config("Concurrency must be >= 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be >= 1"));
        }
        self.retry.validate()?;
        crate::filter::parse_cidrs(&self.exclusions)?;
        Ok(())
    }
}

/// IP family selector for list sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
}

impl IpVersion {
    pub fn record_type(&self) -> RecordType {
        match self {
            IpVersion::V4 => RecordType::A,
            IpVersion::V6 => RecordType::Aaaa,
        }
    }
}

/// Candidate source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// DNS-over-HTTPS lookups of one or more domains
    Doh {
        /// Resolver base URL (e.g. "https://dns.google")
        #[serde(default = "default_doh_resolver")]
        resolver: String,
        /// Domains whose address records are collected
        domains: Vec<String>,
        /// Address record type to ask for
        #[serde(default)]
        record_type: RecordType,
    },

    /// Plain-text list, one address per line
    RawList {
        /// URL to fetch
        url: String,
        /// Keep only this family
        #[serde(default)]
        version: Option<IpVersion>,
        /// Keep only the first N addresses (None = all)
        #[serde(default = "default_source_count")]
        limit: Option<usize>,
    },

    /// ZIP archive of text files, tried mirror by mirror
    Archive {
        /// Ordered mirror list; the first success wins
        urls: Vec<String>,
        /// Also collect full-form IPv6 literals
        #[serde(default)]
        include_ipv6: bool,
    },

    /// Several sources concatenated
    Multi {
        sources: Vec<SourceConfig>,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Doh { resolver, domains, .. } => {
                validate_url("DoH resolver", resolver)?;
                if domains.iter().all(|d| d.trim().is_empty()) {
                    return Err(crate::Error::config("DoH source needs at least one domain"));
                }
                Ok(())
            }
            SourceConfig::RawList { url, limit, .. } => {
                validate_url("Raw list URL", url)?;
                if *limit == Some(0) {
                    return Err(crate::Error::config("Raw list limit must be >= 1 or 'all'"));
                }
                Ok(())
            }
            SourceConfig::Archive { urls, .. } => {
                if urls.is_empty() {
                    return Err(crate::Error::config("Archive source needs at least one URL"));
                }
                urls.iter().try_for_each(|u| validate_url("Archive URL", u))
            }
            SourceConfig::Multi { sources } => {
                if sources.is_empty() {
                    return Err(crate::Error::config("Multi source cannot be empty"));
                }
                sources.iter().try_for_each(SourceConfig::validate)
            }
        }
    }
}

/// Addresses taken from a list source when no count is given
pub const DEFAULT_SOURCE_COUNT: usize = 2;

/// Parse a list source key such as `v4`, `v4@5` or `v6@all`
///
/// Returns the family and the optional limit (`None` = all). A key without
/// a count takes [`DEFAULT_SOURCE_COUNT`] addresses.
pub fn parse_source_key(key: &str) -> Result<(IpVersion, Option<usize>), crate::Error> {
    let (version, count) = match key.split_once('@') {
        Some((version, count)) => (version, Some(count)),
        None => (key, None),
    };

    let version = match version.trim().to_ascii_lowercase().as_str() {
        "v4" => IpVersion::V4,
        "v6" => IpVersion::V6,
        other => {
            return Err(crate::Error::config(format!(
                "Unknown IP version '{other}' in source key '{key}'"
            )));
        }
    };

    let limit = match count.map(str::trim) {
        None => Some(DEFAULT_SOURCE_COUNT),
        Some(c) if c.eq_ignore_ascii_case("all") => None,
        Some(c) => match c.parse::<usize>() {
            Ok(0) | Err(_) => {
                return Err(crate::Error::config(format!(
                    "Invalid count '{c}' in source key '{key}' (expected N >= 1 or 'all')"
                )));
            }
            Ok(n) => Some(n),
        },
    };

    Ok((version, limit))
}

/// Geolocation fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Batch endpoint URL
    #[serde(default = "default_geo_endpoint")]
    pub endpoint: String,

    /// Domain under which `<cc>.<domain>` records are maintained
    pub domain: String,

    /// Addresses per batch (capped at the service maximum)
    #[serde(default = "default_geo_batch_size")]
    pub batch_size: usize,

    /// Concurrent batch requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl GeoConfig {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            endpoint: default_geo_endpoint(),
            domain: domain.into(),
            batch_size: default_geo_batch_size(),
            concurrency: default_concurrency(),
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_url("Geolocation endpoint", &self.endpoint)?;
        if self.domain.trim().is_empty() {
            return Err(crate::Error::config("Geo domain cannot be empty"));
        }
        if self.batch_size == 0 || self.batch_size > crate::geo::MAX_GEO_BATCH {
            return Err(crate::Error::config(format!(
                "Geo batch size must be between 1 and {}",
                crate::geo::MAX_GEO_BATCH
            )));
        }
        if self.concurrency == 0 {
            return Err(crate::Error::config("Geo concurrency must be >= 1"));
        }
        Ok(())
    }
}

/// IP database merge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Local authoritative file
    #[serde(default = "default_merge_output")]
    pub output_path: String,

    /// Path of the published copy in the content store
    #[serde(default = "default_merge_output")]
    pub remote_path: String,

    /// CIDR ranges dropped before persisting
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Fixed UTC offset for header and commit timestamps
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl MergeConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.output_path.trim().is_empty() {
            return Err(crate::Error::config("Merge output path cannot be empty"));
        }
        if self.remote_path.trim().is_empty() {
            return Err(crate::Error::config("Merge remote path cannot be empty"));
        }
        if !(-23..=23).contains(&self.utc_offset_hours) {
            return Err(crate::Error::config(format!(
                "UTC offset must be between -23 and 23 hours. Got: {}",
                self.utc_offset_hours
            )));
        }
        crate::filter::parse_cidrs(&self.exclusions)?;
        Ok(())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            output_path: default_merge_output(),
            remote_path: default_merge_output(),
            exclusions: Vec::new(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

/// Content publisher configuration (GitHub contents API)
#[derive(Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// API base URL
    #[serde(default = "default_github_api")]
    pub api_base: String,

    /// Repository as `owner/name`
    pub repository: String,

    /// Access token
    /// ⚠️ NEVER log this value
    pub token: String,
}

impl std::fmt::Debug for PublisherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherConfig")
            .field("api_base", &self.api_base)
            .field("repository", &self.repository)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_url("Publisher API base", &self.api_base)?;
        match self.repository.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(crate::Error::config(format!(
                    "Repository must be 'owner/name'. Got: {}",
                    self.repository
                )));
            }
        }
        if self.token.trim().is_empty() {
            return Err(crate::Error::config("Publisher token cannot be empty"));
        }
        Ok(())
    }
}

/// Notification webhook configuration (Telegram bot API)
#[derive(Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// API base URL
    #[serde(default = "default_telegram_api")]
    pub api_base: String,

    /// Bot token
    /// ⚠️ NEVER log this value
    pub bot_token: String,

    /// Destination chat
    pub chat_id: String,
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl NotifierConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_url("Notifier API base", &self.api_base)?;
        if self.bot_token.trim().is_empty() {
            return Err(crate::Error::config("Notifier bot token cannot be empty"));
        }
        if self.chat_id.trim().is_empty() {
            return Err(crate::Error::config("Notifier chat id cannot be empty"));
        }
        Ok(())
    }
}

fn validate_url(what: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{what} cannot be empty")));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{what} must use HTTP or HTTPS scheme. Got: {url}"
        )));
    }
    Ok(())
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_source_count() -> Option<usize> {
    Some(DEFAULT_SOURCE_COUNT)
}

fn default_ttl() -> u32 {
    60
}

fn default_concurrency() -> usize {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_doh_resolver() -> String {
    "https://dns.google".to_string()
}

fn default_geo_endpoint() -> String {
    "http://ip-api.com/batch".to_string()
}

fn default_geo_batch_size() -> usize {
    crate::geo::MAX_GEO_BATCH
}

fn default_merge_output() -> String {
    "ip.txt".to_string()
}

fn default_utc_offset_hours() -> i32 {
    8
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualify_record_names() {
        let zone = ZoneContext::new("z", "t").with_zone_name("example.com");
        assert_eq!(zone.qualify("@"), "example.com");
        assert_eq!(zone.qualify("bestcf"), "bestcf.example.com");
        assert_eq!(zone.qualify("bestcf.example.com"), "bestcf.example.com");
        assert_eq!(ZoneContext::new("z", "t").qualify("bestcf"), "bestcf");
    }

    #[test]
    fn zone_context_debug_hides_token() {
        let zone = ZoneContext::new("zone-1", "secret_token_12345");
        let debug = format!("{:?}", zone);
        assert!(!debug.contains("secret_token"));
        assert!(debug.contains("zone-1"));
    }

    #[test]
    fn exact_match_does_not_overmatch() {
        assert!(NameMatch::Exact.matches("cf.example.com", "CF.example.com"));
        assert!(!NameMatch::Exact.matches("cf.example.com", "0101cf-test.example.com"));
        assert!(NameMatch::Contains.matches("cf", "0101cf-test.example.com"));
        assert!(NameMatch::Any.matches("whatever", "other.example.com"));
    }

    #[test]
    fn source_keys() {
        assert_eq!(parse_source_key("v4").unwrap(), (IpVersion::V4, Some(2)));
        assert_eq!(parse_source_key("v4@5").unwrap(), (IpVersion::V4, Some(5)));
        assert_eq!(parse_source_key("v6@all").unwrap(), (IpVersion::V6, None));
        assert!(parse_source_key("v5").is_err());
        assert!(parse_source_key("v4@0").is_err());
        assert!(parse_source_key("v4@many").is_err());
    }

    #[test]
    fn reconcile_config_validation() {
        assert!(ReconcileConfig::new("edge.example.com").validate().is_ok());
        assert!(ReconcileConfig::new("").validate().is_err());
        assert!(
            ReconcileConfig::new("")
                .with_name_match(NameMatch::Any)
                .validate()
                .is_ok()
        );
        assert!(
            ReconcileConfig::new("edge.example.com")
                .with_exclusions(["not-a-cidr"])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn source_config_from_json() {
        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "type": "raw_list",
            "url": "https://example.com/ips.txt",
            "version": "v4",
            "limit": 2,
        }))
        .unwrap();
        assert!(config.validate().is_ok());

        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "type": "raw_list",
            "url": "https://example.com/ips.txt",
        }))
        .unwrap();
        assert!(matches!(config, SourceConfig::RawList { limit: Some(2), .. }));

        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "type": "archive",
            "urls": [],
        }))
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn publisher_repository_format() {
        let mut config = PublisherConfig {
            api_base: default_github_api(),
            repository: "owner/repo".to_string(),
            token: "t".to_string(),
        };
        assert!(config.validate().is_ok());
        config.repository = "owner".to_string();
        assert!(config.validate().is_err());
    }
}
