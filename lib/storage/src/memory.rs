//! In-memory ledger and cache.
//!
//! Used by tests and by `--storage memory`; nothing survives a restart.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use revisit_core::{
    CacheEntry, ContentHash, Error, FeatureVector, FingerprintCache, RecordId, Result,
    VisitLedger, VisitorRecord,
};
use std::ops::ControlFlow;
use std::time::Duration;

/// Ledger backed by a vector; record `n` lives at index `n - 1`
#[derive(Default)]
pub struct MemoryLedger {
    records: RwLock<Vec<VisitorRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot(id: RecordId) -> Option<usize> {
    usize::try_from(id.0).ok()?.checked_sub(1)
}

impl VisitLedger for MemoryLedger {
    fn get(&self, id: RecordId) -> Result<Option<VisitorRecord>> {
        let records = self.records.read();
        Ok(slot(id).and_then(|i| records.get(i)).cloned())
    }

    fn scan(&self, visit: &mut dyn FnMut(&VisitorRecord) -> ControlFlow<()>) -> Result<()> {
        let records = self.records.read();
        for record in records.iter() {
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        fingerprint_hash: &ContentHash,
        features: &FeatureVector,
        now: DateTime<Utc>,
    ) -> Result<VisitorRecord> {
        let mut records = self.records.write();
        let id = RecordId(records.len() as u64 + 1);
        let record = VisitorRecord::new(id, fingerprint_hash.as_hex(), features.clone(), now);
        records.push(record.clone());
        Ok(record)
    }

    fn record_visit(&self, id: RecordId, now: DateTime<Utc>) -> Result<Option<VisitorRecord>> {
        let mut records = self.records.write();
        let Some(record) = slot(id).and_then(|i| records.get_mut(i)) else {
            return Ok(None);
        };
        let before = record.clone();
        record.register_visit(now);
        Ok(Some(before))
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }
}

/// Cache backed by a hash map with per-entry expiry
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<AHashMap<String, (CacheEntry, DateTime<Utc>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| Error::InvalidConfig(format!("cache ttl: {}", e)))?;
    now.checked_add_signed(ttl)
        .ok_or_else(|| Error::InvalidConfig("cache ttl overflows the clock".to_string()))
}

impl FingerprintCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(entry, _)| *entry))
    }

    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()> {
        let expires_at = expiry(Utc::now(), ttl)?;
        self.entries
            .write()
            .insert(key.to_string(), (entry, expires_at));
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok(before - entries.len())
    }
}
