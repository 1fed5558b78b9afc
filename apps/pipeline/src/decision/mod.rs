//! Decision fusion: deterministic threshold rules combined with a probabilistic
//! recommendation from the text-generation capability.
//!
//! Rules (match score on a 0–100 scale):
//! - score < needs_approval OR salary failed OR QA failed → auto_reject
//! - score ≥ auto_approve AND salary passed AND QA passed AND no warnings → auto_approve
//! - otherwise → needs_human_approval
//!
//! Fusion, in order:
//! 1. confidence < low_confidence → needs_human_approval
//! 2. rule == recommendation → that decision
//! 3. any disagreement → needs_human_approval
//!
//! A rule outcome of auto_reject paired with a recommendation of needs_human_approval is a
//! disagreement and therefore goes to a human.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    NeedsHumanApproval,
    AutoReject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoApprove => "auto_approve",
            Decision::NeedsHumanApproval => "needs_human_approval",
            Decision::AutoReject => "auto_reject",
        }
    }

    /// Lenient parse of a label produced by the text-generation capability.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "auto_approve" | "approve" => Some(Decision::AutoApprove),
            "needs_human_approval" | "needs_approval" | "human_review" => {
                Some(Decision::NeedsHumanApproval)
            }
            "auto_reject" | "reject" => Some(Decision::AutoReject),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    /// Match score (0–100) at or above which a clean application is auto-approved.
    pub auto_approve: f64,
    /// Match score (0–100) below which an application is auto-rejected.
    pub needs_approval: f64,
    /// Recommendation confidence (0–1) below which a human always decides.
    pub low_confidence: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 85.0,
            needs_approval: 70.0,
            low_confidence: 0.70,
        }
    }
}

/// Metrics the orchestrator extracts from upstream stage outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub match_score: f64,
    pub salary_passed: bool,
    pub qa_passed: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub decision: Decision,
    pub explanation: String,
}

/// Probabilistic recommendation from the text-generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended_decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub flagged_concerns: Vec<String>,
}

impl Recommendation {
    /// Substituted whenever the capability fails or answers with something unusable.
    /// Never an auto-approve or auto-reject.
    pub fn unavailable() -> Self {
        Self {
            recommended_decision: Decision::NeedsHumanApproval,
            confidence: 0.5,
            reasoning: "recommendation unavailable".to_string(),
            flagged_concerns: vec![],
        }
    }
}

/// Which fusion branch produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPath {
    LowConfidence,
    Agreement,
    Disagreement,
}

/// The orchestrator's output, stored as its stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    pub flagged_concerns: Vec<String>,
    pub rule_decision: Decision,
    pub recommended_decision: Decision,
    pub fusion_path: FusionPath,
    pub metrics: DecisionMetrics,
}

pub fn evaluate_rules(metrics: &DecisionMetrics, thresholds: &DecisionThresholds) -> RuleOutcome {
    let mut reasons = Vec::new();
    if metrics.match_score < thresholds.needs_approval {
        reasons.push(format!(
            "match score {:.1} below {:.1}",
            metrics.match_score, thresholds.needs_approval
        ));
    }
    if !metrics.salary_passed {
        reasons.push("salary below minimum".to_string());
    }
    if !metrics.qa_passed {
        reasons.push("documents failed QA".to_string());
    }
    if !reasons.is_empty() {
        return RuleOutcome {
            decision: Decision::AutoReject,
            explanation: format!("auto_reject: {}", reasons.join("; ")),
        };
    }

    if metrics.match_score >= thresholds.auto_approve && metrics.warnings.is_empty() {
        return RuleOutcome {
            decision: Decision::AutoApprove,
            explanation: format!(
                "auto_approve: match score {:.1} ≥ {:.1}, salary and QA passed, no warnings",
                metrics.match_score, thresholds.auto_approve
            ),
        };
    }

    let explanation = if metrics.match_score < thresholds.auto_approve {
        format!(
            "needs_human_approval: match score {:.1} between {:.1} and {:.1}",
            metrics.match_score, thresholds.needs_approval, thresholds.auto_approve
        )
    } else {
        format!(
            "needs_human_approval: warnings present ({})",
            metrics.warnings.join("; ")
        )
    };
    RuleOutcome {
        decision: Decision::NeedsHumanApproval,
        explanation,
    }
}

pub fn fuse(
    rule: Decision,
    recommendation: &Recommendation,
    low_confidence: f64,
) -> (Decision, FusionPath) {
    // NaN confidence must not pass the threshold.
    if !(recommendation.confidence >= low_confidence) {
        return (Decision::NeedsHumanApproval, FusionPath::LowConfidence);
    }
    if rule == recommendation.recommended_decision {
        return (rule, FusionPath::Agreement);
    }
    (Decision::NeedsHumanApproval, FusionPath::Disagreement)
}

#[derive(Debug, Clone)]
pub struct DecisionFusionEngine {
    thresholds: DecisionThresholds,
}

impl DecisionFusionEngine {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn evaluate_rules(&self, metrics: &DecisionMetrics) -> RuleOutcome {
        evaluate_rules(metrics, &self.thresholds)
    }

    /// Fuses the rule outcome with the recommendation into the final record.
    pub fn decide(
        &self,
        metrics: DecisionMetrics,
        rule: RuleOutcome,
        recommendation: Recommendation,
    ) -> DecisionRecord {
        let (decision, fusion_path) =
            fuse(rule.decision, &recommendation, self.thresholds.low_confidence);

        let path_note = match fusion_path {
            FusionPath::LowConfidence => format!(
                "confidence {:.2} below {:.2}, deferring to a human",
                recommendation.confidence, self.thresholds.low_confidence
            ),
            FusionPath::Agreement => "rules and recommendation agree".to_string(),
            FusionPath::Disagreement => format!(
                "rules ({}) and recommendation ({}) disagree, deferring to a human",
                rule.decision.as_str(),
                recommendation.recommended_decision.as_str()
            ),
        };

        let reasoning = format!(
            "Rules: {}. Recommendation ({}, confidence {:.2}): {}. Final: {} ({}).",
            rule.explanation,
            recommendation.recommended_decision.as_str(),
            recommendation.confidence,
            recommendation.reasoning,
            decision.as_str(),
            path_note
        );

        let mut flagged_concerns = metrics.warnings.clone();
        for concern in &recommendation.flagged_concerns {
            if !flagged_concerns.contains(concern) {
                flagged_concerns.push(concern.clone());
            }
        }

        DecisionRecord {
            decision,
            confidence: recommendation.confidence,
            reasoning,
            flagged_concerns,
            rule_decision: rule.decision,
            recommended_decision: recommendation.recommended_decision,
            fusion_path,
            metrics,
        }
    }
}
