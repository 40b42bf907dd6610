//! Match resolution
//!
//! Per request:
//! 1. normalise the submission and hash it
//! 2. exact-hash cache hit: count a visit on the cached record, similarity 1.0
//! 3. otherwise scan the ledger in insertion order and take the first record
//!    created from the same submission or whose evaluation matches
//! 4. matched: count a visit and point the cache at that record
//! 5. unmatched: create a record and cache it
//!
//! Steps 3 to 5 run under an admission lock, so two concurrent first visits
//! of the same client cannot both create a record. Cache hits skip the lock.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use revisit_core::{
    CacheEntry, ContentHash, Error, FeatureVector, FingerprintCache, Normalized, Normalizer,
    RecordId, Result, VisitLedger, VisitorRecord, DEFAULT_CACHE_TTL,
};
use revisit_similarity::{Decision, Evaluation, Scorer};
use revisit_storage::StorageManager;
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Lifetime of exact-hash cache entries
    pub cache_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    New,
    Matched,
}

/// Which step produced the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPath {
    /// Byte-identical repeat found in the cache
    Cache,
    /// Found by scanning the ledger
    Scan(Decision),
    /// No match; a record was created
    Created,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub record_id: RecordId,
    /// Visit count including this visit
    pub visit_count: u64,
    /// Previous visit, absent for new visitors
    pub last_visit: Option<DateTime<Utc>>,
    /// Present only on a match
    pub similarity: Option<f64>,
    pub path: MatchPath,
}

impl Resolution {
    pub fn is_new_visitor(&self) -> bool {
        self.outcome == Outcome::New
    }

    fn matched(before: &VisitorRecord, similarity: f64, path: MatchPath) -> Self {
        Self {
            outcome: Outcome::Matched,
            record_id: before.id,
            visit_count: before.visit_count + 1,
            last_visit: Some(before.last_visit),
            similarity: Some(similarity),
            path,
        }
    }
}

/// Decides whether a submission belongs to a known visitor
pub struct MatchResolver {
    normalizer: Normalizer,
    scorer: Scorer,
    ledger: Arc<dyn VisitLedger>,
    cache: Arc<dyn FingerprintCache>,
    config: ResolverConfig,
    admission: Mutex<()>,
}

impl MatchResolver {
    pub fn new(
        ledger: Arc<dyn VisitLedger>,
        cache: Arc<dyn FingerprintCache>,
        scorer: Scorer,
        config: ResolverConfig,
    ) -> Self {
        Self {
            normalizer: Normalizer::new(),
            scorer,
            ledger,
            cache,
            config,
            admission: Mutex::new(()),
        }
    }

    pub fn from_storage(storage: &StorageManager, scorer: Scorer, config: ResolverConfig) -> Self {
        Self::new(storage.ledger(), storage.cache(), scorer, config)
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn visitor_count(&self) -> Result<usize> {
        self.ledger.count()
    }

    /// Resolve a raw submission to a visitor.
    ///
    /// Input errors leave all state untouched. Ledger and cache failures
    /// abort the request. A cache write failing after the ledger update
    /// leaves the visit counted.
    pub fn resolve(&self, raw: &Value) -> Result<Resolution> {
        let Normalized { features, hash } = self.normalizer.normalize(raw)?;
        let key = hash.cache_key();

        if let Some(resolution) = self.resolve_cached(&key)? {
            return Ok(resolution);
        }

        let _admitted = self.admission.lock();

        // An identical submission may have been admitted while we waited
        if let Some(resolution) = self.resolve_cached(&key)? {
            return Ok(resolution);
        }

        debug!("Scanning ledger for a fingerprint with {} present features", features.present_count());
        let now = Utc::now();
        if let Some((record, evaluation)) = self.find_match(&features, &hash)? {
            let before = self.ledger.record_visit(record.id, now)?.ok_or_else(|| {
                Error::Storage(format!("visitor {} disappeared during resolution", record.id))
            })?;
            self.remember(&key, before.id)?;

            debug!(
                "Matched visitor {} with score {:.3} via {:?}",
                before.id, evaluation.score, evaluation.decision
            );
            return Ok(Resolution::matched(
                &before,
                evaluation.score,
                MatchPath::Scan(evaluation.decision),
            ));
        }

        let record = self.ledger.insert(&hash, &features, now)?;
        self.remember(&key, record.id)?;
        info!("New visitor {}", record.id);

        Ok(Resolution {
            outcome: Outcome::New,
            record_id: record.id,
            visit_count: record.visit_count,
            last_visit: None,
            similarity: None,
            path: MatchPath::Created,
        })
    }

    fn resolve_cached(&self, key: &str) -> Result<Option<Resolution>> {
        let Some(entry) = self.cache.get(key)? else {
            return Ok(None);
        };

        match self.ledger.record_visit(entry.record_id, Utc::now())? {
            Some(before) => {
                self.remember(key, before.id)?;
                debug!("Cache hit for visitor {}", before.id);
                Ok(Some(Resolution::matched(&before, 1.0, MatchPath::Cache)))
            }
            None => {
                warn!("Cache entry {} points at missing visitor {}", key, entry.record_id);
                Ok(None)
            }
        }
    }

    /// First record in scan order created from the same submission or
    /// accepted by the scorer
    fn find_match(
        &self,
        features: &FeatureVector,
        hash: &ContentHash,
    ) -> Result<Option<(VisitorRecord, Evaluation)>> {
        let mut found = None;
        self.ledger.scan(&mut |record| {
            if record.fingerprint_hash == hash.as_hex() {
                found = Some((
                    record.clone(),
                    Evaluation {
                        score: 1.0,
                        matched: true,
                        decision: Decision::SameFingerprint,
                    },
                ));
                return ControlFlow::Break(());
            }

            let evaluation = self.scorer.evaluate(features, &record.features);
            if !evaluation.matched {
                return ControlFlow::Continue(());
            }
            if tracing::enabled!(Level::DEBUG) {
                let breakdown = self.scorer.explain(features, &record.features);
                debug!(
                    "Visitor {} scored {:.3} (threshold {}), led by {:?}; agreed on {:?}, disagreed on {:?}",
                    record.id,
                    evaluation.score,
                    self.scorer.match_threshold(),
                    breakdown.top_contributing_feature(),
                    breakdown.agreed().collect::<Vec<_>>(),
                    breakdown.disagreed().collect::<Vec<_>>()
                );
            }
            found = Some((record.clone(), evaluation));
            ControlFlow::Break(())
        })?;
        Ok(found)
    }

    fn remember(&self, key: &str, record_id: RecordId) -> Result<()> {
        self.cache
            .put(key, CacheEntry { record_id }, self.config.cache_ttl)
    }
}
