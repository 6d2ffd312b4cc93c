//! DNS reconciler
//!
//! The Reconciler makes the record set under one name equal the filtered
//! candidate set of a source:
//! - Listing the zone's records (with bounded retry)
//! - Deleting every record the name policy matches
//! - Fetching and filtering fresh candidates
//! - Creating one record per surviving candidate
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐        ┌──────────────┐        ┌─────────────────┐
//! │  IpSource   │──────▶ │  Reconciler  │──────▶ │ DnsRecordClient │
//! └─────────────┘        └──────────────┘        └─────────────────┘
//!                               │
//!                               ▼
//!                        ┌──────────────┐
//!                        │    Events    │
//!                        │   (notify)   │
//!                        └──────────────┘
//! ```
//!
//! ## Phases
//!
//! `Idle → Listing → Deleting → FetchingNew → Creating → Done`
//!
//! Every delete is joined before the first create is issued. An empty
//! candidate set still runs the delete phase, leaving the name with no
//! records rather than stale ones.

use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{FailurePolicy, NameMatch, ReconcileConfig};
use crate::error::{Error, Result};
use crate::filter::IpFilter;
use crate::retry::RetryPolicy;
use crate::task_group::TaskGroup;
use crate::traits::{DnsRecord, DnsRecordClient, IpSource, NewRecord, RecordQuery};

/// Reconciliation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Listing,
    Deleting,
    FetchingNew,
    Creating,
    Done,
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Record name that was reconciled
    pub record_name: String,
    /// Records matched for deletion
    pub matched: usize,
    /// Records deleted
    pub deleted: usize,
    /// Deletes that failed (only non-zero under `FailurePolicy::Continue`)
    pub delete_failures: usize,
    /// Candidates that survived filtering
    pub candidates: usize,
    /// Records created
    pub created: usize,
    /// Creates that failed (only non-zero under `FailurePolicy::Continue`)
    pub create_failures: usize,
}

impl ReconcileReport {
    /// Whether every attempted call succeeded
    pub fn is_clean(&self) -> bool {
        self.delete_failures == 0 && self.create_failures == 0
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: deleted {}/{}, created {}/{}",
            self.record_name, self.deleted, self.matched, self.created, self.candidates
        )
    }
}

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A phase started
    PhaseChanged { record_name: String, phase: Phase },

    /// A stale record was deleted
    RecordDeleted { record_name: String, record_id: String },

    /// A delete failed
    DeleteFailed {
        record_name: String,
        record_id: String,
        error: String,
    },

    /// A record was created
    RecordCreated { record_name: String, content: String },

    /// A create failed
    CreateFailed {
        record_name: String,
        content: String,
        error: String,
    },

    /// The run finished
    Completed { report: ReconcileReport },
}

/// DNS reconciler for one zone
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Call [`Reconciler::run()`] (or [`Reconciler::reconcile()`] for another name)
/// 3. Each call starts from `Idle`; nothing is kept between calls
pub struct Reconciler {
    /// Client for the zone's records
    client: Arc<dyn DnsRecordClient>,

    /// Reconcile settings
    config: ReconcileConfig,

    /// Candidate filter built from the config
    filter: IpFilter,

    /// Retry policy for listing
    retry: RetryPolicy,

    /// Fan-out limiter for deletes and creates
    tasks: TaskGroup,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields reconcile events
    pub fn new(
        client: Arc<dyn DnsRecordClient>,
        config: ReconcileConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let filter = IpFilter::from_cidrs(&config.exclusions)?.with_family(config.record_type);

        let reconciler = Self {
            client,
            filter,
            retry: RetryPolicy::from(&config.retry),
            tasks: TaskGroup::new(config.concurrency),
            config,
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconcile the configured record name against `source`
    pub async fn run(&self, source: &dyn IpSource) -> Result<ReconcileReport> {
        let record_name = self.config.record_name.clone();
        self.reconcile(&record_name, source).await
    }

    /// Reconcile `record_name` against `source`
    pub async fn reconcile(
        &self,
        record_name: &str,
        source: &dyn IpSource,
    ) -> Result<ReconcileReport> {
        if self.config.name_match == NameMatch::Any {
            return Err(Error::config(
                "Matching any name deletes the whole record type; only purge accepts it",
            ));
        }

        let mut report = ReconcileReport {
            record_name: record_name.to_string(),
            ..Default::default()
        };

        self.enter(record_name, Phase::Listing);
        let stale = self.list_matching(record_name).await?;
        report.matched = stale.len();

        self.enter(record_name, Phase::Deleting);
        let (deleted, delete_failures) = self.delete_all(record_name, &stale).await?;
        report.deleted = deleted;
        report.delete_failures = delete_failures;

        self.enter(record_name, Phase::FetchingNew);
        let raw = source.fetch().await?;
        let candidates = self.filter.apply(&raw);
        report.candidates = candidates.len();
        debug!(
            "{} source returned {} literal(s), {} candidate(s) after filtering",
            source.source_name(),
            raw.len(),
            candidates.len()
        );

        if candidates.is_empty() {
            warn!(
                "No candidates for {}; leaving the name without records",
                record_name
            );
        } else {
            self.enter(record_name, Phase::Creating);
            let (created, create_failures) = self.create_all(record_name, &candidates).await?;
            report.created = created;
            report.create_failures = create_failures;
        }

        self.enter(record_name, Phase::Done);
        info!("Reconciled {}", report);
        self.emit_event(ReconcileEvent::Completed {
            report: report.clone(),
        });

        Ok(report)
    }

    /// Delete every matching record, re-listing until none remain
    ///
    /// Runs only the listing and deleting phases. Listing is repeated at
    /// most `retry.max_attempts` times; records still present afterwards
    /// are reported as an error.
    pub async fn purge(&self, record_name: &str) -> Result<usize> {
        let mut total = 0;
        let rounds = self.retry.max_attempts();

        for round in 1..=rounds {
            self.enter(record_name, Phase::Listing);
            let stale = self.list_matching(record_name).await?;
            if stale.is_empty() {
                self.enter(record_name, Phase::Done);
                info!(
                    "Purged {} record(s) matching {}",
                    total,
                    describe(record_name, self.config.name_match)
                );
                return Ok(total);
            }

            debug!("Purge round {}: {} record(s) to delete", round, stale.len());
            self.enter(record_name, Phase::Deleting);
            let (deleted, _) = self.delete_all(record_name, &stale).await?;
            total += deleted;
        }

        let left = self.list_matching(record_name).await?.len();
        if left == 0 {
            self.enter(record_name, Phase::Done);
            return Ok(total);
        }
        Err(Error::dns_provider(format!(
            "{left} record(s) matching {} remain after {rounds} purge round(s)",
            describe(record_name, self.config.name_match)
        )))
    }

    /// List records and keep those the name policy matches
    async fn list_matching(&self, record_name: &str) -> Result<Vec<DnsRecord>> {
        let record_type = self.config.record_type;
        let mut query = RecordQuery::all().with_type(record_type);
        if self.config.name_match == NameMatch::Exact {
            query = query.with_name(record_name);
        }

        let records = self
            .retry
            .run("list DNS records", || self.client.list(&query))
            .await?;

        let matching: Vec<DnsRecord> = records
            .into_iter()
            .filter(|r| r.record_type.eq_ignore_ascii_case(record_type.as_str()))
            .filter(|r| self.config.name_match.matches(record_name, &r.name))
            .collect();

        debug!(
            "{} {} record(s) match {}",
            matching.len(),
            record_type,
            describe(record_name, self.config.name_match)
        );
        Ok(matching)
    }

    /// Delete records concurrently, returning (deleted, failed)
    async fn delete_all(&self, record_name: &str, records: &[DnsRecord]) -> Result<(usize, usize)> {
        let outcomes = self
            .tasks
            .run(records, |record| async move {
                let outcome = self.client.delete(&record.id).await;
                (record, outcome)
            })
            .await;

        let mut deleted = 0;
        let mut failed = 0;
        let mut first_error = None;

        for (record, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    deleted += 1;
                    debug!("Deleted {} {} ({})", record.name, record.content, record.id);
                    self.emit_event(ReconcileEvent::RecordDeleted {
                        record_name: record_name.to_string(),
                        record_id: record.id.clone(),
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!("Failed to delete record {} ({}): {}", record.id, record.name, e);
                    self.emit_event(ReconcileEvent::DeleteFailed {
                        record_name: record_name.to_string(),
                        record_id: record.id.clone(),
                        error: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error
            && self.config.on_delete_failure == FailurePolicy::Abort
        {
            return Err(e);
        }
        Ok((deleted, failed))
    }

    /// Create one record per candidate, returning (created, failed)
    async fn create_all(&self, record_name: &str, candidates: &[IpAddr]) -> Result<(usize, usize)> {
        let ttl = self.config.ttl;
        let outcomes = self
            .tasks
            .run(candidates, |ip| async move {
                let record = NewRecord::address(record_name, *ip, ttl);
                let outcome = self.client.create(&record).await;
                (record, outcome)
            })
            .await;

        let mut created = 0;
        let mut failed = 0;
        let mut first_error = None;

        for (record, outcome) in outcomes {
            match outcome {
                Ok(_) => {
                    created += 1;
                    debug!("Created {} {} -> {}", record.record_type, record.name, record.content);
                    self.emit_event(ReconcileEvent::RecordCreated {
                        record_name: record_name.to_string(),
                        content: record.content,
                    });
                }
                Err(e) => {
                    failed += 1;
                    error!("Failed to create {} -> {}: {}", record.name, record.content, e);
                    self.emit_event(ReconcileEvent::CreateFailed {
                        record_name: record_name.to_string(),
                        content: record.content,
                        error: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error
            && self.config.on_create_failure == FailurePolicy::Abort
        {
            return Err(e);
        }
        Ok((created, failed))
    }

    fn enter(&self, record_name: &str, phase: Phase) {
        debug!("{}: entering {:?}", record_name, phase);
        self.emit_event(ReconcileEvent::PhaseChanged {
            record_name: record_name.to_string(),
            phase,
        });
    }

    /// Emit a reconcile event
    fn emit_event(&self, event: ReconcileEvent) {
        // Send event, logging warning if channel is full (backpressure)
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Reconcile event channel full, dropping {:?}", event);
            }
            // Nobody is listening; events are advisory
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

fn describe(record_name: &str, name_match: NameMatch) -> String {
    match name_match {
        NameMatch::Exact => format!("name '{record_name}'"),
        NameMatch::Contains => format!("names containing '{record_name}'"),
        NameMatch::Any => "any name".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_display_and_cleanliness() {
        let report = ReconcileReport {
            record_name: "edge.example.com".to_string(),
            matched: 2,
            deleted: 2,
            candidates: 3,
            created: 2,
            create_failures: 1,
            ..Default::default()
        };
        assert_eq!(report.to_string(), "edge.example.com: deleted 2/2, created 2/3");
        assert!(!report.is_clean());
    }

    #[test]
    fn describe_policies() {
        assert_eq!(describe("cf", NameMatch::Contains), "names containing 'cf'");
        assert_eq!(describe("cf", NameMatch::Any), "any name");
    }
}
