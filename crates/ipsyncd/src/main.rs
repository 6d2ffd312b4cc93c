// # ipsyncd - IP Sync Job Runner
//
// Runs one job and exits. This binary is a thin integration layer: it
// reads configuration from the environment, wires the HTTP integrations
// into the `ipsync-core` engines and maps the outcome to an exit code.
// Reconcile, fan-out, merge and retry logic all live in `ipsync-core`.
//
// ## Jobs (`IPSYNC_JOB`)
//
// - `reconcile`: replace a record name's addresses with a source's
// - `geo`: geolocate the source and reconcile one `<cc>.<domain>` per country
// - `reset`: delete every matching record and create nothing
// - `merge`: merge an archive into the local IP list and publish it
//
// Zone jobs run once per token in `IPSYNC_CF_API_TOKENS`. A failing token
// is logged and the next one still runs; the exit code reports it.
//
// ## Configuration
//
// ### Zone
// - `IPSYNC_CF_API_TOKENS`: comma-separated API tokens
// - `IPSYNC_CF_ZONE_ID`: zone id (single token only; discovered otherwise)
// - `IPSYNC_RECORD_NAME`, `IPSYNC_RECORD_TYPE` (A, AAAA), `IPSYNC_TTL`
// - `IPSYNC_NAME_MATCH`: exact (default), contains, any
// - `IPSYNC_ON_DELETE_FAILURE`, `IPSYNC_ON_CREATE_FAILURE`: continue, abort
//
// ### Source
// - `IPSYNC_SOURCE_TYPE`: doh, raw, archive
// - `IPSYNC_SOURCE_URLS`: domains (doh) or URLs (raw, archive)
// - `IPSYNC_DOH_RESOLVER`, `IPSYNC_TAKE` (N, all, v4@N)
// - `IPSYNC_EXCLUDE_CIDRS`: CIDR list; `cloudflare` adds the edge ranges
//
// ### Geo / Merge / Outputs
// - `IPSYNC_GEO_ENDPOINT`, `IPSYNC_GEO_DOMAIN`
// - `IPSYNC_MERGE_OUTPUT`, `IPSYNC_MERGE_REMOTE_PATH`, `IPSYNC_MERGE_IPV6`,
//   `IPSYNC_UTC_OFFSET_HOURS`
// - `IPSYNC_GITHUB_TOKEN`, `IPSYNC_GITHUB_REPOSITORY`
// - `IPSYNC_TELEGRAM_BOT_TOKEN`, `IPSYNC_TELEGRAM_CHAT_ID`
//
// ### Runtime
// - `IPSYNC_CONCURRENCY`, `IPSYNC_MAX_ATTEMPTS`, `IPSYNC_RETRY_DELAY_MS`
// - `IPSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export IPSYNC_CF_API_TOKENS=token
// export IPSYNC_RECORD_NAME=edge
// export IPSYNC_SOURCE_URLS=cf.example.net
// export IPSYNC_EXCLUDE_CIDRS=cloudflare
//
// ipsyncd
// ```

mod config;

use anyhow::{Context, Result};
use config::{Config, Job};
use ipsync_core::config::ZoneContext;
use ipsync_core::retry::RetryPolicy;
use ipsync_core::traits::{IpSource, Notifier};
use ipsync_core::{GeoFanout, MergePipeline, ReconcileEvent, Reconciler};
use ipsync_ip_http::IpApiGeolocator;
use ipsync_provider_cloudflare::{CLOUDFLARE_API_BASE, CloudflareClient, discover_zone};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the job runner
///
/// - 0: Every part of the job succeeded
/// - 1: Configuration or startup error
/// - 2: The job (or at least one token's run) failed
#[derive(Debug, Clone, Copy)]
enum IpsyncExitCode {
    /// Job completed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime failure
    RuntimeError = 2,
}

impl From<IpsyncExitCode> for ExitCode {
    fn from(code: IpsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {:#}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    info!("Starting ipsyncd {}", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    let notifier = match build_notifier(&config) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Failed to initialize notifier: {:#}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    let outcome = match config.job {
        Job::Merge => run_merge(&config).await,
        _ => run_zones(&config).await,
    };

    match outcome {
        Ok(summary) => {
            info!("{:?} job finished", config.job);
            notify(notifier.as_deref(), &summary).await;
            IpsyncExitCode::Success.into()
        }
        Err(e) => {
            error!("{:?} job failed: {:#}", config.job, e);
            let message = format!("ipsync {:?} job failed: {:#}", config.job, e);
            notify(notifier.as_deref(), &message).await;
            IpsyncExitCode::RuntimeError.into()
        }
    }
}

/// Run a zone job once per token
///
/// Returns the joined per-token summaries, or an error listing every
/// token that failed.
async fn run_zones(config: &Config) -> Result<String> {
    let retry = RetryPolicy::from(&config.retry_config());
    let source = match config.job {
        Job::Reset => None,
        _ => Some(ipsync_ip_http::build_source(&config.source()?, &retry)?),
    };

    let mut summaries = Vec::with_capacity(config.api_tokens.len());
    let mut failures = Vec::new();

    for (index, token) in config.api_tokens.iter().enumerate() {
        let label = format!("token #{}", index + 1);
        match run_token(config, token, source.as_deref()).await {
            Ok(summary) => {
                info!("{}: {}", label, summary);
                summaries.push(format!("{label}: {summary}"));
            }
            Err(e) => {
                error!("{} failed: {:#}", label, e);
                failures.push(format!("{label}: {e:#}"));
            }
        }
    }

    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} token(s) failed: {}",
            failures.len(),
            config.api_tokens.len(),
            failures.join("; ")
        );
    }
    Ok(summaries.join("\n"))
}

/// Run the configured zone job with one token
async fn run_token(config: &Config, token: &str, source: Option<&dyn IpSource>) -> Result<String> {
    let zone = match &config.zone_id {
        Some(zone_id) => ZoneContext::new(zone_id.clone(), token),
        None => {
            let (zone_id, zone_name) = discover_zone(token, CLOUDFLARE_API_BASE)
                .await
                .context("zone discovery failed")?;
            ZoneContext::new(zone_id, token).with_zone_name(zone_name)
        }
    };

    let target = match (config.job, config.target_name()) {
        (Job::Reset, "") => String::new(),
        (_, name) => zone.qualify(name),
    };

    let client = CloudflareClient::new(zone)?;
    let (reconciler, events) = Reconciler::new(Arc::new(client), config.reconcile_config(&target))?;
    let event_log = tokio::spawn(log_events(events));

    let summary = match (config.job, source) {
        (Job::Reset, _) => {
            let purged = reconciler.purge(&target).await?;
            format!("purged {purged} record(s)")
        }
        (Job::Geo, Some(source)) => {
            let geolocator = IpApiGeolocator::new(config.geo_config(&target).endpoint)?;
            let fanout = GeoFanout::new(Arc::new(geolocator), config.geo_config(&target))?;
            let report = fanout.run(&reconciler, source).await?;
            if report.succeeded() == 0 && report.failed() > 0 {
                anyhow::bail!("all {} country bucket(s) failed", report.failed());
            }
            format!(
                "{} candidate(s), {} bucket(s) reconciled, {} failed",
                report.candidates,
                report.succeeded(),
                report.failed()
            )
        }
        (_, Some(source)) => reconciler.run(source).await?.to_string(),
        (_, None) => anyhow::bail!("{:?} job needs an address source", config.job),
    };

    // Dropping the reconciler closes the channel and ends the logger
    drop(reconciler);
    if let Err(e) = event_log.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    Ok(summary)
}

async fn run_merge(config: &Config) -> Result<String> {
    let retry = RetryPolicy::from(&config.retry_config());
    let source = ipsync_ip_http::build_source(&config.source()?, &retry)?;

    #[allow(unused_mut)]
    let mut pipeline = MergePipeline::new(config.merge_config())?;

    #[cfg(feature = "github")]
    if let Some(publisher) = config.publisher_config()? {
        let store = ipsync_publish_github::GithubContentStore::new(publisher)?;
        pipeline = pipeline.with_store(Arc::new(store));
    }

    #[cfg(not(feature = "github"))]
    if config.publisher_config()?.is_some() {
        warn!("GitHub publishing is configured but the github feature is disabled");
    }

    let report = pipeline.run(source.as_ref()).await?;
    Ok(format!(
        "{}: {} address(es) ({} new from {} scanned){}",
        pipeline.file().path().display(),
        report.total,
        report.added,
        report.scanned,
        if report.published { ", published" } else { "" }
    ))
}

/// Log reconcile progress until the reconciler is dropped
async fn log_events(mut events: mpsc::Receiver<ReconcileEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ReconcileEvent::PhaseChanged { record_name, phase } => {
                debug!("{}: {:?}", record_name, phase);
            }
            ReconcileEvent::DeleteFailed { record_name, record_id, error } => {
                warn!("{}: delete of {} failed: {}", record_name, record_id, error);
            }
            ReconcileEvent::CreateFailed { record_name, content, error } => {
                warn!("{}: create of {} failed: {}", record_name, content, error);
            }
            ReconcileEvent::Completed { report } => {
                debug!("Completed {}", report);
            }
            other => tracing::trace!("{:?}", other),
        }
    }
}

#[cfg(feature = "telegram")]
fn build_notifier(config: &Config) -> Result<Option<Box<dyn Notifier>>> {
    Ok(match config.notifier_config()? {
        Some(notifier) => Some(Box::new(ipsync_notify_telegram::TelegramNotifier::new(notifier)?)),
        None => None,
    })
}

#[cfg(not(feature = "telegram"))]
fn build_notifier(config: &Config) -> Result<Option<Box<dyn Notifier>>> {
    if config.notifier_config()?.is_some() {
        warn!("Telegram notifications are configured but the telegram feature is disabled");
    }
    Ok(None)
}

/// Send `message`; delivery failures are logged and never change the outcome
async fn notify(notifier: Option<&dyn Notifier>, message: &str) {
    let Some(notifier) = notifier else {
        return;
    };
    if let Err(e) = notifier.notify(message).await {
        warn!("{} notification failed: {}", notifier.notifier_name(), e);
    }
}
