//! Contracts of the external collaborators
//!
//! The resolver only talks to the visitor ledger and the fingerprint cache
//! through these traits, so both can be swapped for in-memory fakes.

use crate::feature::FeatureVector;
use crate::normalize::ContentHash;
use crate::record::{RecordId, VisitorRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::time::Duration;

/// Default lifetime of a cache entry (24h)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86_400);

/// Durable store of one record per known visitor
pub trait VisitLedger: Send + Sync {
    fn get(&self, id: RecordId) -> Result<Option<VisitorRecord>>;

    /// Visit records in insertion order until `visit` breaks
    fn scan(&self, visit: &mut dyn FnMut(&VisitorRecord) -> ControlFlow<()>) -> Result<()>;

    /// Create a record with `visit_count = 1`
    fn insert(
        &self,
        fingerprint_hash: &ContentHash,
        features: &FeatureVector,
        now: DateTime<Utc>,
    ) -> Result<VisitorRecord>;

    /// Count a visit on `id`, returning the record as it was before the update,
    /// or `None` if no such record exists.
    fn record_visit(&self, id: RecordId, now: DateTime<Utc>) -> Result<Option<VisitorRecord>>;

    fn count(&self) -> Result<usize>;
}

/// Cached pointer from an exact content hash to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "id")]
    pub record_id: RecordId,
}

/// Time-bounded accelerator index; never the source of truth
pub trait FingerprintCache: Send + Sync {
    /// Expired entries read as absent
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Write or refresh an entry
    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()>;

    /// Drop expired entries, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;
}

impl std::fmt::Debug for dyn VisitLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VisitLedger {{ ... }}")
    }
}

impl std::fmt::Debug for dyn FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FingerprintCache {{ ... }}")
    }
}
