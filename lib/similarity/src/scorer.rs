//! Weighted agreement score between two feature vectors
//!
//! For every feature in the weight table:
//! - skipped (weight left out of the denominator) when missing on either side
//! - fuzzy features agree when their ratio reaches the feature's threshold
//! - every other feature agrees only on exact equality
//!
//! The score is agreeing weight over compared weight, and 0.0 when nothing
//! was comparable.

use crate::distance::{exact_match, fuzzy_ratio, lists_overlap};
use crate::explain::{FeatureComparison, FeatureOutcome, ScoreBreakdown};
use crate::schema::{MatchPolicy, SchemaError, SimilarityConfig};
use revisit_core::{Feature, FeatureKind, FeatureValue, FeatureVector};

/// How an [`Evaluation`] reached its verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Weighted score against the match threshold
    Weighted,
    /// A strong identifier matched outright
    StrongIdentifier(Feature),
    /// The stored record was created from this exact submission
    SameFingerprint,
}

/// Slack when comparing a score to the match threshold, so a ratio that is
/// exactly the threshold in decimal is not lost to rounding.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Match verdict for a candidate/record pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub matched: bool,
    pub decision: Decision,
}

/// Scores fingerprint pairs against a validated [`SimilarityConfig`]
#[derive(Debug, Clone)]
pub struct Scorer {
    config: SimilarityConfig,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            config: SimilarityConfig::default(),
        }
    }
}

impl Scorer {
    /// Validate `config` and build a scorer from it
    pub fn new(mut config: SimilarityConfig) -> Result<Self, SchemaError> {
        config.validate_and_normalize()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    pub fn match_threshold(&self) -> f64 {
        self.config.match_threshold
    }

    /// Weighted agreement in [0.0, 1.0]; symmetric in its arguments
    pub fn score(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        self.explain(a, b).score()
    }

    /// Per-feature breakdown behind [`Scorer::score`]
    pub fn explain(&self, a: &FeatureVector, b: &FeatureVector) -> ScoreBreakdown {
        let comparisons = self
            .config
            .features
            .iter()
            .map(|(&feature, rule)| {
                let (outcome, ratio) = compare(feature, a.get(feature), b.get(feature), rule.threshold);
                FeatureComparison {
                    feature,
                    weight: rule.weight,
                    outcome,
                    ratio,
                }
            })
            .collect();

        ScoreBreakdown { comparisons }
    }

    /// Decide whether `candidate` is the visitor behind `stored`
    pub fn evaluate(&self, candidate: &FeatureVector, stored: &FeatureVector) -> Evaluation {
        if self.config.policy == MatchPolicy::StrongIdentifiers {
            if let Some(feature) = strong_identifier(candidate, stored) {
                return Evaluation {
                    score: 1.0,
                    matched: true,
                    decision: Decision::StrongIdentifier(feature),
                };
            }
        }

        let breakdown = self.explain(candidate, stored);
        let score = breakdown.score();
        Evaluation {
            score,
            matched: breakdown.considered_weight() > 0.0
                && score + SCORE_EPSILON >= self.config.match_threshold,
            decision: Decision::Weighted,
        }
    }
}

fn compare(
    feature: Feature,
    a: FeatureValue<'_>,
    b: FeatureValue<'_>,
    threshold: f64,
) -> (FeatureOutcome, Option<f64>) {
    if !a.is_present() || !b.is_present() {
        return (FeatureOutcome::Skipped, None);
    }

    let agreed = |yes: bool| {
        if yes {
            FeatureOutcome::Agreed
        } else {
            FeatureOutcome::Disagreed
        }
    };

    match (a, b) {
        (FeatureValue::Text(x), FeatureValue::Text(y)) if feature.kind() == FeatureKind::Fuzzy => {
            let ratio = fuzzy_ratio(x, y);
            (agreed(ratio >= threshold), Some(ratio))
        }
        (FeatureValue::Text(x), FeatureValue::Text(y)) => (agreed(exact_match(x, y)), None),
        (FeatureValue::Flag(x), FeatureValue::Flag(y)) => (agreed(x == y), None),
        // Shapes never mix for one feature; treat it as no evidence
        _ => (FeatureOutcome::Skipped, None),
    }
}

/// Identifier that alone ties two fingerprints together, if any
pub fn strong_identifier(a: &FeatureVector, b: &FeatureVector) -> Option<Feature> {
    if !a.cookie.is_empty() && a.cookie == b.cookie {
        return Some(Feature::Cookie);
    }
    if !a.canvas.is_empty() && a.canvas == b.canvas {
        return Some(Feature::Canvas);
    }
    if !a.public_ip.is_empty()
        && a.public_ip == b.public_ip
        && lists_overlap(a.intranet_ips(), b.intranet_ips())
    {
        return Some(Feature::IntranetIp);
    }
    None
}
