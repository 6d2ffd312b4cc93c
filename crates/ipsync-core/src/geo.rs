//! Country-bucketed fan-out
//!
//! Candidates are geolocated in batches, grouped by country code, and each
//! bucket is reconciled under its own `<cc>.<domain>` name.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{GeoConfig, NameMatch};
use crate::engine::{ReconcileReport, Reconciler};
use crate::error::{Error, Result};
use crate::filter::IpFilter;
use crate::task_group::TaskGroup;
use crate::traits::{Geolocator, IpSource, StaticSource};

/// Largest batch the geolocation service accepts
pub const MAX_GEO_BATCH: usize = 99;

/// Addresses grouped by upper-case country code
pub type CountryBuckets = BTreeMap<String, BTreeSet<IpAddr>>;

/// Geolocate `addresses` and group them by country
///
/// Batches are issued through a [`TaskGroup`] of `concurrency`. A failed
/// batch is logged and its addresses are dropped. Addresses without a
/// country code (or with the service's "Unknown" marker) are discarded.
pub async fn bucket_by_country(
    geolocator: &dyn Geolocator,
    addresses: &[IpAddr],
    batch_size: usize,
    concurrency: usize,
) -> CountryBuckets {
    let batch_size = batch_size.min(geolocator.max_batch()).clamp(1, MAX_GEO_BATCH);
    let batches: Vec<Vec<String>> = addresses
        .chunks(batch_size)
        .map(|chunk| chunk.iter().map(IpAddr::to_string).collect())
        .collect();

    debug!(
        "Geolocating {} address(es) in {} batch(es)",
        addresses.len(),
        batches.len()
    );

    let outcomes = TaskGroup::new(concurrency)
        .run(&batches, |batch| async move { geolocator.locate(batch).await })
        .await;

    let mut buckets = CountryBuckets::new();
    let mut unknown = 0usize;

    for (batch, outcome) in batches.iter().zip(outcomes) {
        let answers = match outcome {
            Ok(answers) => answers,
            Err(e) => {
                warn!(
                    "{} lookup failed for a batch of {}: {}",
                    geolocator.geolocator_name(),
                    batch.len(),
                    e
                );
                continue;
            }
        };

        for answer in answers {
            let Ok(ip) = answer.query.trim().parse::<IpAddr>() else {
                continue;
            };
            match answer.country_code.as_deref().map(str::trim) {
                Some(code) if !code.is_empty() && !code.eq_ignore_ascii_case("unknown") => {
                    buckets.entry(code.to_ascii_uppercase()).or_default().insert(ip);
                }
                _ => unknown += 1,
            }
        }
    }

    if unknown > 0 {
        debug!("Dropped {} address(es) with no country code", unknown);
    }
    buckets
}

/// Outcome of one bucket
#[derive(Debug, Clone)]
pub struct BucketOutcome {
    /// Upper-case country code
    pub country_code: String,
    /// Record name the bucket was reconciled under
    pub record_name: String,
    /// Addresses in the bucket
    pub size: usize,
    /// Reconcile report, or the error text if the bucket failed
    pub result: std::result::Result<ReconcileReport, String>,
}

/// Outcome of a geo fan-out run
#[derive(Debug, Clone, Default)]
pub struct GeoReport {
    /// Candidates submitted for geolocation
    pub candidates: usize,
    /// Per-bucket outcomes, largest bucket first
    pub buckets: Vec<BucketOutcome>,
}

impl GeoReport {
    pub fn failed(&self) -> usize {
        self.buckets.iter().filter(|b| b.result.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.buckets.len() - self.failed()
    }
}

/// Geolocate a source's candidates and reconcile one name per country
pub struct GeoFanout {
    geolocator: Arc<dyn Geolocator>,
    config: GeoConfig,
}

impl GeoFanout {
    pub fn new(geolocator: Arc<dyn Geolocator>, config: GeoConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { geolocator, config })
    }

    /// Record name for a country bucket
    pub fn record_name(&self, country_code: &str) -> String {
        format!(
            "{}.{}",
            country_code.to_ascii_lowercase(),
            self.config.domain.trim_end_matches('.')
        )
    }

    /// Run the fan-out
    ///
    /// The reconciler's exclusions and record type are applied before
    /// geolocation. Buckets are reconciled one after another, largest
    /// first (ties by country code); a failed bucket does not stop the
    /// remaining ones.
    pub async fn run(&self, reconciler: &Reconciler, source: &dyn IpSource) -> Result<GeoReport> {
        let config = reconciler.config();
        if config.name_match == NameMatch::Any {
            return Err(Error::config(
                "Geo fan-out needs exact or contains matching; 'any' would clear the other buckets",
            ));
        }
        let filter = IpFilter::from_cidrs(&config.exclusions)?.with_family(config.record_type);

        let raw = source.fetch().await?;
        let candidates = filter.apply(&raw);
        info!(
            "Geo fan-out: {} candidate(s) from {}",
            candidates.len(),
            source.source_name()
        );

        let buckets = bucket_by_country(
            self.geolocator.as_ref(),
            &candidates,
            self.config.batch_size,
            self.config.concurrency,
        )
        .await;

        let mut ordered: Vec<(String, BTreeSet<IpAddr>)> = buckets.into_iter().collect();
        ordered.sort_by(|(a_code, a), (b_code, b)| {
            b.len().cmp(&a.len()).then_with(|| a_code.cmp(b_code))
        });

        let mut report = GeoReport {
            candidates: candidates.len(),
            buckets: Vec::with_capacity(ordered.len()),
        };

        for (country_code, addresses) in ordered {
            let record_name = self.record_name(&country_code);
            let bucket_source = StaticSource::new(addresses.iter().map(IpAddr::to_string));

            let result = match reconciler.reconcile(&record_name, &bucket_source).await {
                Ok(r) => Ok(r),
                Err(e) => {
                    error!("Bucket {} ({}) failed: {}", country_code, record_name, e);
                    Err(e.to_string())
                }
            };

            report.buckets.push(BucketOutcome {
                country_code,
                record_name,
                size: addresses.len(),
                result,
            });
        }

        info!(
            "Geo fan-out finished: {} bucket(s) reconciled, {} failed",
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }
}
