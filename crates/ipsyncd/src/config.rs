// # ipsyncd configuration
//
// Every setting comes from an `IPSYNC_*` environment variable. The
// variables are read once, validated, and turned into the typed
// configuration structs of `ipsync-core`; nothing downstream reads the
// environment again.

use anyhow::{Context, Result};
use ipsync_core::config::{
    FailurePolicy, GeoConfig, IpVersion, MergeConfig, NameMatch, NotifierConfig,
    PublisherConfig, ReconcileConfig, RetryConfig, SourceConfig, DEFAULT_SOURCE_COUNT,
    parse_source_key,
};
use ipsync_core::filter::CLOUDFLARE_IPV4_RANGES;
use ipsync_core::traits::RecordType;
use std::str::FromStr;

/// Job selected by `IPSYNC_JOB`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Replace a name's records with a source's addresses
    Reconcile,
    /// Reconcile one `<cc>.<domain>` name per country
    Geo,
    /// Merge an archive into the local list and publish it
    Merge,
    /// Delete every matching record and create nothing
    Reset,
}

impl Job {
    /// Whether the job talks to the DNS zone
    pub fn uses_zone(&self) -> bool {
        !matches!(self, Job::Merge)
    }
}

impl FromStr for Job {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reconcile" => Ok(Job::Reconcile),
            "geo" => Ok(Job::Geo),
            "merge" => Ok(Job::Merge),
            "reset" => Ok(Job::Reset),
            other => anyhow::bail!(
                "IPSYNC_JOB '{}' is not valid. Valid jobs: reconcile, geo, merge, reset",
                other
            ),
        }
    }
}

/// Candidate size selected by `IPSYNC_TAKE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Take {
    version: Option<IpVersion>,
    limit: Option<usize>,
}

/// Parse `N`, `all`, or a source key (`v4`, `v4@5`, `v6@all`)
fn parse_take(raw: &str) -> Result<Take> {
    let raw = raw.trim();
    if raw.to_ascii_lowercase().starts_with('v') {
        let (version, limit) = parse_source_key(raw)?;
        return Ok(Take {
            version: Some(version),
            limit,
        });
    }
    if raw.eq_ignore_ascii_case("all") {
        return Ok(Take {
            version: None,
            limit: None,
        });
    }
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Take {
            version: None,
            limit: Some(n),
        }),
        _ => anyhow::bail!(
            "IPSYNC_TAKE '{}' is not valid. Use a count >= 1, 'all', or a key like 'v4@5'",
            raw
        ),
    }
}

/// Application configuration
pub struct Config {
    pub job: Job,
    pub api_tokens: Vec<String>,
    pub zone_id: Option<String>,
    pub record_name: String,
    pub record_type: RecordType,
    pub ttl: u32,
    pub name_match: NameMatch,
    pub source_type: String,
    pub source_urls: Vec<String>,
    pub doh_resolver: Option<String>,
    pub take: Option<String>,
    pub exclusions: Vec<String>,
    pub on_create_failure: FailurePolicy,
    pub on_delete_failure: FailurePolicy,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub geo_endpoint: Option<String>,
    pub geo_domain: Option<String>,
    pub merge_output: Option<String>,
    pub merge_remote_path: Option<String>,
    pub merge_ipv6: bool,
    pub utc_offset_hours: i32,
    pub github_token: Option<String>,
    pub github_repository: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: String,
}

// Custom Debug implementation that hides every credential
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("job", &self.job)
            .field("api_tokens", &format!("<{} REDACTED>", self.api_tokens.len()))
            .field("zone_id", &self.zone_id)
            .field("record_name", &self.record_name)
            .field("record_type", &self.record_type)
            .field("source_type", &self.source_type)
            .field("source_urls", &self.source_urls)
            .field("github_repository", &self.github_repository)
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let list = |key: &str| -> Vec<String> {
            get(key)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let job: Job = get("IPSYNC_JOB").as_deref().unwrap_or("reconcile").parse()?;

        let record_name = get("IPSYNC_RECORD_NAME").unwrap_or_default();

        // A reset without a name clears the whole record type
        let name_match = match get("IPSYNC_NAME_MATCH") {
            Some(raw) => raw.parse().context("IPSYNC_NAME_MATCH")?,
            None if job == Job::Reset && record_name.is_empty() => NameMatch::Any,
            None => NameMatch::Exact,
        };

        let record_type = match get("IPSYNC_RECORD_TYPE") {
            Some(raw) => raw.parse().context("IPSYNC_RECORD_TYPE")?,
            None => RecordType::A,
        };

        let mut exclusions = Vec::new();
        for entry in list("IPSYNC_EXCLUDE_CIDRS") {
            if entry.eq_ignore_ascii_case("cloudflare") {
                exclusions.extend(CLOUDFLARE_IPV4_RANGES.iter().map(|s| s.to_string()));
            } else {
                exclusions.push(entry);
            }
        }

        Ok(Self {
            job,
            api_tokens: list("IPSYNC_CF_API_TOKENS"),
            zone_id: get("IPSYNC_CF_ZONE_ID"),
            record_name,
            record_type,
            ttl: parse_or(get("IPSYNC_TTL"), "IPSYNC_TTL", 60)?,
            name_match,
            source_type: get("IPSYNC_SOURCE_TYPE")
                .unwrap_or_else(|| default_source_type(job).to_string())
                .to_ascii_lowercase(),
            source_urls: list("IPSYNC_SOURCE_URLS"),
            doh_resolver: get("IPSYNC_DOH_RESOLVER"),
            take: get("IPSYNC_TAKE"),
            exclusions,
            on_create_failure: match get("IPSYNC_ON_CREATE_FAILURE") {
                Some(raw) => raw.parse().context("IPSYNC_ON_CREATE_FAILURE")?,
                None => FailurePolicy::Continue,
            },
            on_delete_failure: match get("IPSYNC_ON_DELETE_FAILURE") {
                Some(raw) => raw.parse().context("IPSYNC_ON_DELETE_FAILURE")?,
                None => FailurePolicy::Continue,
            },
            concurrency: parse_or(get("IPSYNC_CONCURRENCY"), "IPSYNC_CONCURRENCY", 10)?,
            max_attempts: parse_or(get("IPSYNC_MAX_ATTEMPTS"), "IPSYNC_MAX_ATTEMPTS", 3)?,
            retry_delay_ms: parse_or(get("IPSYNC_RETRY_DELAY_MS"), "IPSYNC_RETRY_DELAY_MS", 500)?,
            geo_endpoint: get("IPSYNC_GEO_ENDPOINT"),
            geo_domain: get("IPSYNC_GEO_DOMAIN"),
            merge_output: get("IPSYNC_MERGE_OUTPUT"),
            merge_remote_path: get("IPSYNC_MERGE_REMOTE_PATH"),
            merge_ipv6: parse_bool(get("IPSYNC_MERGE_IPV6"), "IPSYNC_MERGE_IPV6")?,
            utc_offset_hours: parse_or(
                get("IPSYNC_UTC_OFFSET_HOURS"),
                "IPSYNC_UTC_OFFSET_HOURS",
                8,
            )?,
            github_token: get("IPSYNC_GITHUB_TOKEN"),
            github_repository: get("IPSYNC_GITHUB_REPOSITORY"),
            telegram_bot_token: get("IPSYNC_TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("IPSYNC_TELEGRAM_CHAT_ID"),
            log_level: get("IPSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Runs before any network call; every failure names the variable to fix.
    pub fn validate(&self) -> Result<()> {
        if self.job.uses_zone() {
            if self.api_tokens.is_empty() {
                anyhow::bail!(
                    "IPSYNC_CF_API_TOKENS is required for the {:?} job. \
                    Set it via: export IPSYNC_CF_API_TOKENS=token1,token2",
                    self.job
                );
            }

            // Check for obvious placeholder tokens (common mistake)
            for token in &self.api_tokens {
                let lower = token.to_lowercase();
                let placeholder = lower.contains("your_token")
                    || lower.contains("replace_me")
                    || lower == "token";
                if placeholder {
                    anyhow::bail!(
                        "IPSYNC_CF_API_TOKENS contains a placeholder. \
                        Use an actual API token with DNS edit permission."
                    );
                }
            }

            if self.zone_id.is_some() && self.api_tokens.len() > 1 {
                anyhow::bail!(
                    "IPSYNC_CF_ZONE_ID cannot be combined with several tokens; \
                    leave it unset so each token's zone is discovered"
                );
            }
        }

        match self.job {
            Job::Reconcile if self.record_name.is_empty() => {
                anyhow::bail!("IPSYNC_RECORD_NAME is required for the reconcile job")
            }
            Job::Reset if self.record_name.is_empty() && self.name_match != NameMatch::Any => {
                anyhow::bail!(
                    "IPSYNC_RECORD_NAME is required for the reset job unless IPSYNC_NAME_MATCH=any"
                )
            }
            _ => {}
        }

        if self.name_match == NameMatch::Any && self.job != Job::Reset {
            anyhow::bail!(
                "IPSYNC_NAME_MATCH=any is only allowed for the reset job; \
                the {:?} job would delete every {} record in the zone",
                self.job,
                self.record_type.as_str()
            );
        }

        if self.job != Job::Reset {
            self.source()?.validate()?;
        }

        if self.job.uses_zone() {
            self.reconcile_config(self.target_name()).validate()?;
        } else {
            self.merge_config().validate()?;
        }

        if self.job == Job::Geo {
            if self.zone_id.is_some() && self.geo_domain.is_none() {
                anyhow::bail!(
                    "IPSYNC_GEO_DOMAIN is required for the geo job when IPSYNC_CF_ZONE_ID is set"
                );
            }
            self.geo_config(self.target_name()).validate()?;
        }

        if let Some(publisher) = self.publisher_config()? {
            publisher.validate()?;
        }
        if let Some(notifier) = self.notifier_config()? {
            notifier.validate()?;
        }

        if !(1..=10).contains(&self.max_attempts) {
            anyhow::bail!(
                "IPSYNC_MAX_ATTEMPTS must be between 1 and 10. Got: {}",
                self.max_attempts
            );
        }

        if self.retry_delay_ms > 60_000 {
            anyhow::bail!(
                "IPSYNC_RETRY_DELAY_MS must be at most 60000. Got: {}",
                self.retry_delay_ms
            );
        }

        // Validate log level
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "IPSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Unqualified name the job works on
    ///
    /// The geo job maintains `<cc>.<domain>` names; without
    /// `IPSYNC_GEO_DOMAIN` the domain is the zone apex (`@`).
    pub fn target_name(&self) -> &str {
        match self.job {
            Job::Geo => self.geo_domain.as_deref().unwrap_or("@"),
            _ => &self.record_name,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay_ms: self.retry_delay_ms,
            max_delay_ms: self.retry_delay_ms.saturating_mul(16).max(self.retry_delay_ms),
        }
    }

    /// Reconcile settings for an already qualified record name
    pub fn reconcile_config(&self, record_name: &str) -> ReconcileConfig {
        let mut config = ReconcileConfig::new(record_name)
            .with_record_type(self.record_type)
            .with_ttl(self.ttl)
            .with_name_match(self.name_match)
            .with_exclusions(self.exclusions.iter().cloned())
            .with_failure_policies(self.on_delete_failure, self.on_create_failure)
            .with_retry(self.retry_config());
        config.concurrency = self.concurrency;
        config
    }

    /// Source described by the `IPSYNC_SOURCE_*` variables
    pub fn source(&self) -> Result<SourceConfig> {
        if self.source_urls.is_empty() {
            anyhow::bail!(
                "IPSYNC_SOURCE_URLS is required for the {:?} job \
                (domains for doh, URLs for raw and archive)",
                self.job
            );
        }

        let source = match self.source_type.as_str() {
            "doh" => SourceConfig::Doh {
                resolver: self
                    .doh_resolver
                    .clone()
                    .unwrap_or_else(|| "https://dns.google".to_string()),
                domains: self.source_urls.clone(),
                record_type: self.record_type,
            },
            "raw" => {
                let take = match &self.take {
                    Some(raw) => parse_take(raw)?,
                    None => Take {
                        version: None,
                        limit: Some(DEFAULT_SOURCE_COUNT),
                    },
                };
                let version = take.version.or(Some(match self.record_type {
                    RecordType::A => IpVersion::V4,
                    RecordType::Aaaa => IpVersion::V6,
                }));
                let mut sources: Vec<SourceConfig> = self
                    .source_urls
                    .iter()
                    .map(|url| SourceConfig::RawList {
                        url: url.clone(),
                        version,
                        limit: take.limit,
                    })
                    .collect();
                if sources.len() == 1 {
                    sources.remove(0)
                } else {
                    SourceConfig::Multi { sources }
                }
            }
            "archive" => SourceConfig::Archive {
                urls: self.source_urls.clone(),
                include_ipv6: self.merge_ipv6,
            },
            other => anyhow::bail!(
                "IPSYNC_SOURCE_TYPE '{}' is not supported. Supported types: doh, raw, archive",
                other
            ),
        };
        Ok(source)
    }

    pub fn geo_config(&self, domain: &str) -> GeoConfig {
        let mut config = GeoConfig::new(domain);
        if let Some(endpoint) = &self.geo_endpoint {
            config.endpoint = endpoint.clone();
        }
        config.concurrency = self.concurrency;
        config
    }

    pub fn merge_config(&self) -> MergeConfig {
        let defaults = MergeConfig::default();
        let output_path = self.merge_output.clone().unwrap_or(defaults.output_path);
        MergeConfig {
            remote_path: self
                .merge_remote_path
                .clone()
                .unwrap_or_else(|| output_path.clone()),
            output_path,
            exclusions: self.exclusions.clone(),
            utc_offset_hours: self.utc_offset_hours,
        }
    }

    /// Publisher settings, if both token and repository are set
    pub fn publisher_config(&self) -> Result<Option<PublisherConfig>> {
        match (&self.github_token, &self.github_repository) {
            (Some(token), Some(repository)) => Ok(Some(PublisherConfig {
                api_base: "https://api.github.com".to_string(),
                repository: repository.clone(),
                token: token.clone(),
            })),
            (None, None) => Ok(None),
            _ => anyhow::bail!(
                "IPSYNC_GITHUB_TOKEN and IPSYNC_GITHUB_REPOSITORY must be set together"
            ),
        }
    }

    /// Notifier settings, if both bot token and chat id are set
    pub fn notifier_config(&self) -> Result<Option<NotifierConfig>> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(bot_token), Some(chat_id)) => Ok(Some(NotifierConfig {
                api_base: "https://api.telegram.org".to_string(),
                bot_token: bot_token.clone(),
                chat_id: chat_id.clone(),
            })),
            (None, None) => Ok(None),
            _ => anyhow::bail!(
                "IPSYNC_TELEGRAM_BOT_TOKEN and IPSYNC_TELEGRAM_CHAT_ID must be set together"
            ),
        }
    }
}

fn default_source_type(job: Job) -> &'static str {
    match job {
        Job::Merge => "archive",
        _ => "doh",
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} '{}' is not a valid number", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => anyhow::bail!("{} '{}' is not a valid boolean", key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const TOKEN: (&str, &str) = ("IPSYNC_CF_API_TOKENS", "cf_token_abcdefghijklmnop");

    #[test]
    fn minimal_reconcile_config_is_valid() {
        let cfg = config(&[
            TOKEN,
            ("IPSYNC_RECORD_NAME", "edge"),
            ("IPSYNC_SOURCE_URLS", "cf.example.com"),
        ])
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.job, Job::Reconcile);
        assert_eq!(cfg.name_match, NameMatch::Exact);
        assert!(matches!(cfg.source().unwrap(), SourceConfig::Doh { .. }));
    }

    #[test]
    fn missing_token_rejected() {
        let cfg = config(&[
            ("IPSYNC_RECORD_NAME", "edge"),
            ("IPSYNC_SOURCE_URLS", "cf.example.com"),
        ])
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reset_defaults_to_any_name() {
        let cfg = config(&[TOKEN, ("IPSYNC_JOB", "reset")]).unwrap();
        assert_eq!(cfg.name_match, NameMatch::Any);
        cfg.validate().unwrap();

        let named = config(&[TOKEN, ("IPSYNC_JOB", "reset"), ("IPSYNC_RECORD_NAME", "edge")])
            .unwrap();
        assert_eq!(named.name_match, NameMatch::Exact);
        named.validate().unwrap();
    }

    #[test]
    fn any_name_only_for_reset() {
        for job in ["reconcile", "geo"] {
            let cfg = config(&[
                TOKEN,
                ("IPSYNC_JOB", job),
                ("IPSYNC_RECORD_NAME", "edge"),
                ("IPSYNC_NAME_MATCH", "any"),
                ("IPSYNC_SOURCE_URLS", "cf.example.com"),
            ])
            .unwrap();
            assert!(cfg.validate().is_err(), "{job} accepted any-name matching");
        }

        let reset = config(&[TOKEN, ("IPSYNC_JOB", "reset"), ("IPSYNC_NAME_MATCH", "any")])
            .unwrap();
        reset.validate().unwrap();
    }

    #[test]
    fn geo_defaults_to_zone_apex() {
        let cfg = config(&[
            TOKEN,
            ("IPSYNC_JOB", "geo"),
            ("IPSYNC_SOURCE_URLS", "cf.example.com"),
        ])
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.target_name(), "@");

        let pinned = config(&[
            TOKEN,
            ("IPSYNC_JOB", "geo"),
            ("IPSYNC_CF_ZONE_ID", "zone123"),
            ("IPSYNC_SOURCE_URLS", "cf.example.com"),
        ])
        .unwrap();
        assert!(pinned.validate().is_err());
    }

    #[test]
    fn cloudflare_keyword_expands_exclusions() {
        let cfg = config(&[TOKEN, ("IPSYNC_EXCLUDE_CIDRS", "10.0.0.0/8, cloudflare")]).unwrap();
        assert_eq!(cfg.exclusions.len(), 1 + CLOUDFLARE_IPV4_RANGES.len());
        assert_eq!(cfg.exclusions[0], "10.0.0.0/8");
    }

    #[test]
    fn raw_source_takes_key_or_count() {
        let cfg = config(&[
            TOKEN,
            ("IPSYNC_RECORD_NAME", "edge"),
            ("IPSYNC_SOURCE_TYPE", "raw"),
            ("IPSYNC_SOURCE_URLS", "https://example.com/ips.txt"),
            ("IPSYNC_TAKE", "v6@5"),
        ])
        .unwrap();
        match cfg.source().unwrap() {
            SourceConfig::RawList { version, limit, .. } => {
                assert_eq!(version, Some(IpVersion::V6));
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected source {other:?}"),
        }

        let bare = config(&[
            TOKEN,
            ("IPSYNC_RECORD_NAME", "edge"),
            ("IPSYNC_SOURCE_TYPE", "raw"),
            ("IPSYNC_SOURCE_URLS", "https://example.com/ips.txt"),
        ])
        .unwrap();
        match bare.source().unwrap() {
            SourceConfig::RawList { version, limit, .. } => {
                assert_eq!(version, Some(IpVersion::V4));
                assert_eq!(limit, Some(2));
            }
            other => panic!("unexpected source {other:?}"),
        }

        assert_eq!(parse_take("v4").unwrap().limit, Some(2));
        assert_eq!(parse_take("all").unwrap().limit, None);
        assert_eq!(parse_take("3").unwrap().limit, Some(3));
        assert!(parse_take("0").is_err());
    }

    #[test]
    fn merge_job_needs_no_zone() {
        let cfg = config(&[
            ("IPSYNC_JOB", "merge"),
            ("IPSYNC_SOURCE_URLS", "https://example.com/a.zip,https://mirror.example.com/a.zip"),
            ("IPSYNC_MERGE_OUTPUT", "data/ip.txt"),
        ])
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.merge_config().remote_path, "data/ip.txt");
        assert!(matches!(cfg.source().unwrap(), SourceConfig::Archive { .. }));
    }

    #[test]
    fn half_configured_publisher_rejected() {
        let cfg = config(&[
            ("IPSYNC_JOB", "merge"),
            ("IPSYNC_SOURCE_URLS", "https://example.com/a.zip"),
            ("IPSYNC_GITHUB_TOKEN", "gh"),
        ])
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(config(&[("IPSYNC_JOB", "sync")]).is_err());
        assert!(config(&[("IPSYNC_TTL", "soon")]).is_err());
        assert!(config(&[("IPSYNC_NAME_MATCH", "regex")]).is_err());
        assert!(config(&[("IPSYNC_MERGE_IPV6", "maybe")]).is_err());
    }

    #[test]
    fn debug_hides_tokens() {
        let cfg = config(&[TOKEN, ("IPSYNC_GITHUB_TOKEN", "gh_secret")]).unwrap();
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("cf_token"));
        assert!(!debug.contains("gh_secret"));
    }
}
