//! Test doubles and common utilities for contract tests
//!
//! These doubles record every call so tests can assert on what was sent,
//! in which order, and how often.

#![allow(dead_code)]

use ipsync_core::error::{Error, Result};
use ipsync_core::traits::{
    ContentStore, ContentUpdate, DnsRecord, DnsRecordClient, GeoAnswer, Geolocator, IpSource,
    NewRecord, RecordQuery,
};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One call observed by [`InMemoryZone`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneOp {
    List,
    Delete(String),
    Create(NewRecord),
}

/// In-memory DNS zone with failure injection
#[derive(Clone, Default)]
pub struct InMemoryZone {
    records: Arc<Mutex<Vec<DnsRecord>>>,
    ops: Arc<Mutex<Vec<ZoneOp>>>,
    next_id: Arc<AtomicUsize>,
    /// Record ids whose delete fails
    failing_deletes: Arc<Mutex<HashSet<String>>>,
    /// Contents whose create fails
    failing_creates: Arc<Mutex<HashSet<String>>>,
    /// Number of upcoming list calls that fail transiently
    list_failures: Arc<AtomicUsize>,
    /// Deletes that report success but leave the record in place
    sticky_deletes: Arc<AtomicUsize>,
}

impl InMemoryZone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zone seeded with `records`
    pub fn with_records(records: Vec<DnsRecord>) -> Self {
        let zone = Self::new();
        *zone.records.lock().unwrap() = records;
        zone
    }

    pub fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_create(&self, content: &str) {
        self.failing_creates.lock().unwrap().insert(content.to_string());
    }

    pub fn fail_next_lists(&self, n: usize) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    pub fn ignore_next_deletes(&self, n: usize) {
        self.sticky_deletes.store(n, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<DnsRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Contents of records named `name`, sorted
    pub fn contents(&self, name: &str) -> Vec<String> {
        let mut contents: Vec<String> = self
            .records()
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.content)
            .collect();
        contents.sort();
        contents
    }

    pub fn ops(&self) -> Vec<ZoneOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ZoneOp::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> Vec<NewRecord> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ZoneOp::Create(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.ops().iter().filter(|op| **op == ZoneOp::List).count()
    }
}

#[async_trait::async_trait]
impl DnsRecordClient for InMemoryZone {
    async fn list(&self, query: &RecordQuery) -> Result<Vec<DnsRecord>> {
        self.ops.lock().unwrap().push(ZoneOp::List);

        if self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::http("connection reset"));
        }

        Ok(self
            .records()
            .into_iter()
            .filter(|r| query.name.as_ref().is_none_or(|n| &r.name == n))
            .filter(|r| {
                query
                    .record_type
                    .is_none_or(|t| r.record_type == t.as_str())
            })
            .collect())
    }

    async fn delete(&self, record_id: &str) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(ZoneOp::Delete(record_id.to_string()));

        if self.failing_deletes.lock().unwrap().contains(record_id) {
            return Err(Error::provider("memory", format!("cannot delete {record_id}")));
        }
        if self
            .sticky_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(());
        }

        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != record_id);
        if records.len() == before {
            return Err(Error::not_found(record_id.to_string()));
        }
        Ok(())
    }

    async fn create(&self, record: &NewRecord) -> Result<DnsRecord> {
        self.ops
            .lock()
            .unwrap()
            .push(ZoneOp::Create(record.clone()));

        if self.failing_creates.lock().unwrap().contains(&record.content) {
            return Err(Error::provider("memory", format!("cannot create {}", record.content)));
        }

        let id = format!("new-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = DnsRecord {
            id,
            record_type: record.record_type.as_str().to_string(),
            name: record.name.clone(),
            content: record.content.clone(),
            ttl: record.ttl,
            proxied: record.proxied,
        };
        self.records.lock().unwrap().push(created.clone());
        Ok(created)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// An A record in the in-memory zone
pub fn a_record(id: &str, name: &str, content: &str) -> DnsRecord {
    DnsRecord {
        id: id.to_string(),
        record_type: "A".to_string(),
        name: name.to_string(),
        content: content.to_string(),
        ttl: 60,
        proxied: false,
    }
}

/// Source that fails every fetch
pub struct FailingSource;

#[async_trait::async_trait]
impl IpSource for FailingSource {
    async fn fetch(&self) -> Result<Vec<String>> {
        Err(Error::ip_source("all mirrors failed"))
    }

    fn source_name(&self) -> &'static str {
        "failing"
    }
}

/// Geolocator answering from a fixed table, counting calls
#[derive(Clone, Default)]
pub struct CountingGeolocator {
    table: HashMap<String, String>,
    calls: Arc<AtomicUsize>,
    largest_batch: Arc<AtomicUsize>,
    /// Batches containing this address fail
    poison: Option<String>,
}

impl CountingGeolocator {
    pub fn new<I, A, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(a, c)| (a.into(), c.into()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn poisoned_by(mut self, address: &str) -> Self {
        self.poison = Some(address.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn largest_batch(&self) -> usize {
        self.largest_batch.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Geolocator for CountingGeolocator {
    async fn locate(&self, batch: &[String]) -> Result<Vec<GeoAnswer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(batch.len(), Ordering::SeqCst);

        if let Some(poison) = &self.poison
            && batch.contains(poison)
        {
            return Err(Error::rate_limited("too many requests"));
        }

        Ok(batch
            .iter()
            .map(|ip| GeoAnswer::new(ip.clone(), self.table.get(ip).cloned()))
            .collect())
    }

    fn max_batch(&self) -> usize {
        99
    }

    fn geolocator_name(&self) -> &'static str {
        "counting"
    }
}

/// Content store that records every publish
#[derive(Clone, Default)]
pub struct RecordingStore {
    revision: Arc<Mutex<Option<String>>>,
    published: Arc<Mutex<Vec<ContentUpdate>>>,
    reject: bool,
}

impl RecordingStore {
    /// Store where nothing exists yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Store holding a file at `revision`
    pub fn at_revision(revision: &str) -> Self {
        let store = Self::default();
        *store.revision.lock().unwrap() = Some(revision.to_string());
        store
    }

    /// Store that refuses every publish
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<ContentUpdate> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContentStore for RecordingStore {
    async fn revision(&self, _path: &str) -> Result<Option<String>> {
        Ok(self.revision.lock().unwrap().clone())
    }

    async fn publish(&self, update: &ContentUpdate) -> Result<()> {
        if self.reject {
            return Err(Error::publisher("409 Conflict: sha does not match"));
        }
        self.published.lock().unwrap().push(update.clone());
        *self.revision.lock().unwrap() = Some(format!("rev-{}", self.published().len()));
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "recording"
    }
}
