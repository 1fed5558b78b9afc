//! Job match scoring: weighted multi-criteria coverage with fuzzy technology matching.
//!
//! The scorer is a pure function of the criteria and the "found" classification produced by
//! the text-generation capability. It never calls out and never fails.
//!
//! Algorithm:
//! 1. For each technology category: coverage = matched criteria items / criteria items.
//!    A criteria item is matched when any found item is a fuzzy match for it.
//!    An empty criteria list has coverage 1.0.
//! 2. Location: primary = 1.0, acceptable = 0.5, anything else = 0.0.
//! 3. final_score = clamp(Σ weight × component, 0, 1). Weights need not sum to 1.
//! 4. approved = final_score ≥ match_threshold.

pub mod fuzzy;

use serde::{Deserialize, Serialize};

pub use fuzzy::is_fuzzy_match;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub must_have: f64,
    pub strong_preference: f64,
    pub nice_to_have: f64,
    pub location: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            must_have: 0.5,
            strong_preference: 0.3,
            nice_to_have: 0.1,
            location: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationPreference {
    pub primary: Vec<String>,
    pub acceptable: Vec<String>,
}

/// Candidate preferences a job is scored against. Immutable for a scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriteria {
    pub must_have: Vec<String>,
    pub strong_preference: Vec<String>,
    pub nice_to_have: Vec<String>,
    pub location: LocationPreference,
    pub weights: ScoringWeights,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationTier {
    Primary,
    Acceptable,
    #[default]
    NoMatch,
}

impl LocationTier {
    /// Lenient parse of the tier label returned by the text-generation capability.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "primary" => LocationTier::Primary,
            "acceptable" => LocationTier::Acceptable,
            _ => LocationTier::NoMatch,
        }
    }

    pub fn score(self) -> f64 {
        match self {
            LocationTier::Primary => 1.0,
            LocationTier::Acceptable => 0.5,
            LocationTier::NoMatch => 0.0,
        }
    }
}

/// Technology mentions found in the job text, per criteria category, plus the location tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoundItems {
    #[serde(default)]
    pub must_have: Vec<String>,
    #[serde(default)]
    pub strong_preference: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
    #[serde(default)]
    pub location: LocationTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchComponents {
    pub must_have: f64,
    pub strong_preference: f64,
    pub nice_to_have: f64,
    pub location: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub components: MatchComponents,
    pub final_score: f64,
    pub approved: bool,
    /// Criteria items with no matching mention, for the audit trail.
    pub unmatched_must_have: Vec<String>,
}

/// Fraction of `criteria` items matched by at least one `found` item.
pub fn coverage(criteria: &[String], found: &[String]) -> f64 {
    if criteria.is_empty() {
        return 1.0;
    }
    let matched = criteria
        .iter()
        .filter(|item| found.iter().any(|f| is_fuzzy_match(item, f)))
        .count();
    matched as f64 / criteria.len() as f64
}

#[derive(Debug, Clone)]
pub struct JobMatchScorer {
    criteria: ScoringCriteria,
    threshold: f64,
}

impl JobMatchScorer {
    pub fn new(criteria: ScoringCriteria, threshold: f64) -> Self {
        Self {
            criteria,
            threshold,
        }
    }

    pub fn criteria(&self) -> &ScoringCriteria {
        &self.criteria
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, found: &FoundItems) -> MatchScore {
        let components = MatchComponents {
            must_have: coverage(&self.criteria.must_have, &found.must_have),
            strong_preference: coverage(
                &self.criteria.strong_preference,
                &found.strong_preference,
            ),
            nice_to_have: coverage(&self.criteria.nice_to_have, &found.nice_to_have),
            location: found.location.score(),
        };

        let w = &self.criteria.weights;
        let weighted = w.must_have * components.must_have
            + w.strong_preference * components.strong_preference
            + w.nice_to_have * components.nice_to_have
            + w.location * components.location;
        let final_score = if weighted.is_finite() {
            weighted.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let unmatched_must_have = self
            .criteria
            .must_have
            .iter()
            .filter(|item| !found.must_have.iter().any(|f| is_fuzzy_match(item, f)))
            .cloned()
            .collect();

        MatchScore {
            components,
            final_score,
            approved: final_score >= self.threshold,
            unmatched_must_have,
        }
    }
}
