//! # revisit Core
//!
//! Core types for recognising returning visitors from weak browser
//! fingerprints.
//!
//! - [`Feature`] / [`FeatureVector`] - the fixed attribute schema
//! - [`Normalizer`] - untrusted JSON bag to typed vector plus [`ContentHash`]
//! - [`VisitorRecord`] - one known visitor and its visit statistics
//! - [`VisitLedger`] / [`FingerprintCache`] - contracts of the stores the
//!   resolver talks to
//!
//! ## Example
//!
//! ```rust
//! use revisit_core::{Feature, Normalizer};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "userAgent": "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5)",
//!     "timezone": "Europe/Rome",
//!     "fonts": ["Helvetica", "Menlo"],
//! });
//! let normalized = Normalizer::new().normalize(&raw).unwrap();
//! assert_eq!(normalized.features.fonts, "Helvetica, Menlo");
//! assert!(normalized.features.get(Feature::Timezone).is_present());
//! assert!(normalized.hash.cache_key().starts_with("fp:"));
//! ```

pub mod error;
pub mod feature;
pub mod normalize;
pub mod record;
pub mod store;

pub use error::{Error, Result};
pub use feature::{Feature, FeatureKind, FeatureValue, FeatureVector, INTRANET_IP_SEPARATOR};
pub use normalize::{ContentHash, Normalized, Normalizer};
pub use record::{RecordId, VisitorRecord};
pub use store::{CacheEntry, FingerprintCache, VisitLedger, DEFAULT_CACHE_TTL};
