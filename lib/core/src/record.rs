//! Visitor records
//!
//! One record per recognised visitor, keyed by a surrogate [`RecordId`].

use crate::feature::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key of a visitor record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One known visitor and its visit statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub id: RecordId,
    /// Hex content hash of the submission that created the record
    pub fingerprint_hash: String,
    /// Features as stored when the record was created
    pub features: FeatureVector,
    pub visit_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
}

impl VisitorRecord {
    pub fn new(
        id: RecordId,
        fingerprint_hash: impl Into<String>,
        features: FeatureVector,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            fingerprint_hash: fingerprint_hash.into(),
            features,
            visit_count: 1,
            created_at: now,
            last_visit: now,
        }
    }

    /// Count one more visit. `last_visit` never moves backwards.
    pub fn register_visit(&mut self, now: DateTime<Utc>) {
        self.visit_count += 1;
        if now > self.last_visit {
            self.last_visit = now;
        }
    }
}
