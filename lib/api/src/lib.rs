//! # revisit API
//!
//! Match resolution and its HTTP surface.
//!
//! - [`MatchResolver`] - cache short-circuit, linear scan, record creation
//! - [`RestApi`] - `POST /api/fingerprint`

pub mod resolver;
pub mod rest;

pub use resolver::{MatchPath, MatchResolver, Outcome, Resolution, ResolverConfig};
pub use rest::RestApi;
