//! Similarity configuration
//!
//! The weight table says which features count toward a match and how much.
//! It ships with the AHP priority vector as defaults and can be replaced from
//! a JSON file.

use revisit_core::Feature;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum aggregate score to declare two fingerprints the same visitor
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.75;

/// Weight and comparison threshold for one feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureRule {
    /// Importance of the feature in the aggregate score
    pub weight: f64,

    /// Minimum fuzzy ratio for the feature to count as agreeing.
    /// Only fuzzy features read it; everything else needs equality.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    1.0
}

fn default_version() -> u32 {
    1
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

impl FeatureRule {
    pub fn exact(weight: f64) -> Self {
        Self {
            weight,
            threshold: 1.0,
        }
    }

    pub fn fuzzy(weight: f64, threshold: f64) -> Self {
        Self { weight, threshold }
    }
}

/// Which evidence may declare a match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Only the weighted score decides
    #[default]
    WeightedOnly,
    /// Equal cookie, equal canvas hash, or same public IP with an overlapping
    /// intranet address match outright, before weighting
    StrongIdentifiers,
}

/// Weight table plus decision parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Per-feature rules; features not listed are ignored
    pub features: BTreeMap<Feature, FeatureRule>,

    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    #[serde(default)]
    pub policy: MatchPolicy,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self::ahp_defaults()
    }
}

impl SimilarityConfig {
    pub fn new(features: BTreeMap<Feature, FeatureRule>) -> Self {
        Self {
            version: 1,
            features,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            policy: MatchPolicy::default(),
        }
    }

    /// The published AHP priority vector
    pub fn ahp_defaults() -> Self {
        let features = BTreeMap::from([
            (Feature::UserAgent, FeatureRule::fuzzy(0.195, 0.8)),
            (Feature::Platform, FeatureRule::exact(0.065)),
            (Feature::Cookie, FeatureRule::exact(0.043)),
            (Feature::Canvas, FeatureRule::exact(0.075)),
            (Feature::Webgl, FeatureRule::exact(0.065)),
            (Feature::PublicIp, FeatureRule::exact(0.033)),
            (Feature::IntranetIp, FeatureRule::exact(0.033)),
            (Feature::ColorDepth, FeatureRule::exact(0.033)),
            (Feature::ScreenResolution, FeatureRule::exact(0.033)),
            (Feature::Timezone, FeatureRule::exact(0.045)),
            (Feature::Language, FeatureRule::exact(0.11)),
            (Feature::Fonts, FeatureRule::fuzzy(0.065, 0.7)),
            (Feature::Plugins, FeatureRule::fuzzy(0.04, 0.7)),
            (Feature::LocalStorage, FeatureRule::exact(0.033)),
            (Feature::IndexedDb, FeatureRule::exact(0.033)),
            (Feature::OpenDatabase, FeatureRule::exact(0.033)),
            (Feature::DoNotTrack, FeatureRule::exact(0.065)),
        ]);
        Self::new(features)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;
        config.validate_and_normalize()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Validate the configuration
    /// - weights must be non-negative with a positive total
    /// - thresholds must lie in [0, 1]
    /// - weights are rescaled to sum to 1.0 when they drift by more than 0.01
    pub fn validate_and_normalize(&mut self) -> Result<(), SchemaError> {
        if self.features.is_empty() {
            return Err(SchemaError::EmptySchema);
        }

        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(SchemaError::MatchThresholdOutOfRange(self.match_threshold));
        }

        for (feature, rule) in &self.features {
            if rule.weight < 0.0 || !rule.weight.is_finite() {
                return Err(SchemaError::NegativeWeight(*feature));
            }
            if !(0.0..=1.0).contains(&rule.threshold) {
                return Err(SchemaError::ThresholdOutOfRange(*feature, rule.threshold));
            }
        }

        let weight_sum = self.total_weight();
        if weight_sum <= 0.0 {
            return Err(SchemaError::ZeroTotalWeight);
        }

        if (weight_sum - 1.0).abs() > 0.01 {
            for rule in self.features.values_mut() {
                rule.weight /= weight_sum;
            }
        }

        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.features.values().map(|r| r.weight).sum()
    }

    pub fn rule(&self, feature: Feature) -> Option<&FeatureRule> {
        self.features.get(&feature)
    }
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchemaError {
    #[error("Weight table cannot be empty")]
    EmptySchema,

    #[error("Feature '{0}' has a negative or non-finite weight")]
    NegativeWeight(Feature),

    #[error("Total weight cannot be zero")]
    ZeroTotalWeight,

    #[error("Feature '{0}' has threshold {1} outside [0, 1]")]
    ThresholdOutOfRange(Feature, f64),

    #[error("Match threshold {0} outside [0, 1]")]
    MatchThresholdOutOfRange(f64),

    #[error("Invalid similarity config: {0}")]
    Parse(String),
}

impl From<SchemaError> for revisit_core::Error {
    fn from(e: SchemaError) -> Self {
        revisit_core::Error::InvalidConfig(e.to_string())
    }
}
