//! # revisit
//!
//! Recognises a returning browser from weakly identifying attributes (user
//! agent, canvas and WebGL hashes, fonts, IP, timezone, ...) without a stable
//! identifier.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! revisit --http-port 3000 --data-dir ./data
//! curl -X POST localhost:3000/api/fingerprint \
//!      -H 'content-type: application/json' \
//!      -d '{"userAgent": "Mozilla/5.0 ...", "timezone": "Europe/Rome"}'
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use revisit::prelude::*;
//! use serde_json::json;
//!
//! let storage = StorageManager::in_memory();
//! let resolver = MatchResolver::from_storage(&storage, Scorer::default(), ResolverConfig::default());
//!
//! let fp = json!({"userAgent": "Mozilla/5.0 (X11; Linux x86_64)", "language": "en-GB"});
//! let first = resolver.resolve(&fp).unwrap();
//! assert!(first.is_new_visitor());
//!
//! let again = resolver.resolve(&fp).unwrap();
//! assert_eq!(again.visit_count, 2);
//! assert_eq!(again.similarity, Some(1.0));
//! ```
//!
//! ## Crate Structure
//!
//! - `revisit-core` - feature schema, normaliser, content hash, store contracts
//! - `revisit-similarity` - weight table and scorer
//! - `revisit-storage` - in-memory and LMDB ledger/cache
//! - `revisit-api` - match resolver and REST endpoint

pub use revisit_core::{
    CacheEntry, ContentHash, Error, Feature, FeatureKind, FeatureVector, FingerprintCache,
    Normalized, Normalizer, RecordId, Result, VisitLedger, VisitorRecord,
};

pub use revisit_similarity::{
    Decision, Evaluation, FeatureRule, MatchPolicy, ScoreBreakdown, Scorer, SimilarityConfig,
};

pub use revisit_storage::{LmdbStorage, MemoryCache, MemoryLedger, StorageBackend, StorageManager};

pub use revisit_api::{MatchPath, MatchResolver, Outcome, Resolution, ResolverConfig, RestApi};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Feature, FeatureVector, Normalizer, ContentHash,
        VisitorRecord, RecordId, VisitLedger, FingerprintCache,
        Scorer, SimilarityConfig, MatchPolicy,
        StorageManager,
        MatchResolver, ResolverConfig, Resolution, Outcome,
        Error, Result,
    };
}
