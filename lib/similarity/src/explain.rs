//! Explainability for fingerprint comparisons
//!
//! Shows, feature by feature, what took part in a score and what it
//! contributed.

use revisit_core::Feature;
use serde::Serialize;

/// What happened to one feature during a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureOutcome {
    /// Missing on at least one side; weight left out of the denominator
    Skipped,
    /// Contributed its full weight
    Agreed,
    /// Compared and contributed nothing
    Disagreed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureComparison {
    pub feature: Feature,
    pub weight: f64,
    pub outcome: FeatureOutcome,
    /// Fuzzy ratio, for fuzzy features that were compared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<f64>,
}

impl FeatureComparison {
    pub fn contribution(&self) -> f64 {
        match self.outcome {
            FeatureOutcome::Agreed => self.weight,
            FeatureOutcome::Skipped | FeatureOutcome::Disagreed => 0.0,
        }
    }
}

/// Full breakdown of a score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub comparisons: Vec<FeatureComparison>,
}

impl ScoreBreakdown {
    /// Sum of weights of agreeing features
    pub fn contributed_weight(&self) -> f64 {
        self.comparisons.iter().map(|c| c.contribution()).sum()
    }

    /// Sum of weights of features compared on both sides
    pub fn considered_weight(&self) -> f64 {
        self.comparisons
            .iter()
            .filter(|c| c.outcome != FeatureOutcome::Skipped)
            .map(|c| c.weight)
            .sum()
    }

    /// Contributed over considered weight; 0.0 when nothing was comparable
    pub fn score(&self) -> f64 {
        let considered = self.considered_weight();
        if considered <= 0.0 {
            return 0.0;
        }
        (self.contributed_weight() / considered).clamp(0.0, 1.0)
    }

    pub fn agreed(&self) -> impl Iterator<Item = Feature> + '_ {
        self.comparisons
            .iter()
            .filter(|c| c.outcome == FeatureOutcome::Agreed)
            .map(|c| c.feature)
    }

    pub fn disagreed(&self) -> impl Iterator<Item = Feature> + '_ {
        self.comparisons
            .iter()
            .filter(|c| c.outcome == FeatureOutcome::Disagreed)
            .map(|c| c.feature)
    }

    /// Feature with the largest contribution, if any agreed
    pub fn top_contributing_feature(&self) -> Option<Feature> {
        self.comparisons
            .iter()
            .filter(|c| c.outcome == FeatureOutcome::Agreed)
            .max_by(|a, b| {
                a.weight
                    .partial_cmp(&b.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| c.feature)
    }
}
