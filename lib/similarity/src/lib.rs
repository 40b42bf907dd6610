//! # revisit Similarity
//!
//! Weighted, partially-fuzzy agreement scoring between two browser
//! fingerprints.
//!
//! ## Features
//!
//! - **Weight table**: static per-feature importance (AHP priority vector by
//!   default), loadable from JSON
//! - **Fuzzy features**: user agent, fonts and plugins compared with a
//!   bigram similarity ratio against a per-feature threshold
//! - **Adaptive denominator**: features missing on either side do not count
//! - **Explainability**: per-feature outcome for every comparison
//!
//! ## Example
//!
//! ```rust
//! use revisit_core::FeatureVector;
//! use revisit_similarity::{Scorer, SimilarityConfig};
//!
//! let scorer = Scorer::new(SimilarityConfig::default()).unwrap();
//!
//! let a = FeatureVector {
//!     platform: "Linux x86_64".to_string(),
//!     timezone: "Europe/Rome".to_string(),
//!     language: "it-IT".to_string(),
//!     ..Default::default()
//! };
//! let mut b = a.clone();
//! b.timezone = "UTC".to_string();
//!
//! let score = scorer.score(&a, &b);
//! assert!(score > 0.75 && score < 1.0);
//! ```
//!
//! ## Scoring Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Candidate  │────>│   Scorer    │<────│   Stored    │
//! │   vector    │     │ (weights)   │     │   vector    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                     ┌─────────────┐
//!                     │  Breakdown  │
//!                     │  (explain)  │
//!                     └─────────────┘
//! ```

pub mod schema;
pub mod distance;
pub mod scorer;
pub mod explain;

pub use schema::{
    SimilarityConfig,
    FeatureRule,
    MatchPolicy,
    SchemaError,
    DEFAULT_MATCH_THRESHOLD,
};
pub use scorer::{Scorer, Evaluation, Decision, strong_identifier, SCORE_EPSILON};
pub use explain::{ScoreBreakdown, FeatureComparison, FeatureOutcome};
