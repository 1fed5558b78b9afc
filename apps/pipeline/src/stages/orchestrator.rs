//! Orchestrator: the final decision stage.
//!
//! Reads every required upstream output, evaluates the rule table, asks for a recommendation
//! and fuses the two. It refuses to decide when an upstream output is missing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::decision::{
    Decision, DecisionFusionEngine, DecisionMetrics, Recommendation, RuleOutcome,
};
use crate::errors::StageError;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::models::{StageId, StageOutput, StageOutputs};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{DECISION_PROMPT_TEMPLATE, DECISION_SYSTEM};
use crate::store::ApplicationStore;

pub const WARN_SALARY_MISSING: &str = "salary not stated";
pub const WARN_SALARY_ABOVE_MAX: &str = "salary above configured maximum";
pub const WARN_LOCATION_ACCEPTABLE: &str = "location is only an acceptable match";

/// Pulls the decision metrics out of the untyped stage outputs.
///
/// Absent fields read as the failing value: score 0, salary not met, QA not passed.
pub fn extract_metrics(outputs: &StageOutputs) -> DecisionMetrics {
    let field = |stage: StageId, key: &str| outputs.raw(stage).and_then(|v| v.get(key).cloned());
    let flag = |stage: StageId, key: &str| {
        field(stage, key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    };

    let final_score = field(StageId::JobMatcher, "final_score")
        .and_then(|v| v.as_f64())
        .filter(|s| s.is_finite())
        .unwrap_or(0.0);
    let match_score = (final_score * 100.0).clamp(0.0, 100.0);

    let salary_met = flag(StageId::SalaryValidator, "meets_threshold");
    let salary_missing = flag(StageId::SalaryValidator, "missing");

    let mut warnings = Vec::new();
    if salary_missing {
        warnings.push(WARN_SALARY_MISSING.to_string());
    }
    if flag(StageId::SalaryValidator, "exceeds_maximum") {
        warnings.push(WARN_SALARY_ABOVE_MAX.to_string());
    }

    let qa_warnings = field(StageId::Qa, "warnings")
        .and_then(|v| match v {
            Value::Array(items) => Some(items),
            _ => None,
        })
        .unwrap_or_default();
    warnings.extend(
        qa_warnings
            .iter()
            .filter_map(Value::as_str)
            .map(|w| format!("qa: {w}")),
    );

    let location = outputs
        .raw(StageId::JobMatcher)
        .and_then(|v| v.pointer("/found/location"))
        .and_then(Value::as_str);
    if location == Some("acceptable") {
        warnings.push(WARN_LOCATION_ACCEPTABLE.to_string());
    }

    DecisionMetrics {
        match_score,
        // A missing salary is not a failed one; the warning keeps it away from auto-approve.
        salary_passed: salary_met || salary_missing,
        qa_passed: flag(StageId::Qa, "passed"),
        warnings,
    }
}

/// Recommendation as returned by the model, before validation.
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    recommended_decision: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    flagged_concerns: Vec<String>,
}

impl RawRecommendation {
    fn validate(self) -> Option<Recommendation> {
        let decision = Decision::from_label(&self.recommended_decision)?;
        if !self.confidence.is_finite() {
            return None;
        }
        Some(Recommendation {
            recommended_decision: decision,
            confidence: self.confidence.clamp(0.0, 1.0),
            reasoning: self.reasoning,
            flagged_concerns: self.flagged_concerns,
        })
    }
}

pub struct OrchestratorStage {
    llm: Arc<dyn TextGenerator>,
    store: Arc<dyn ApplicationStore>,
    engine: DecisionFusionEngine,
    required: Vec<StageId>,
}

impl OrchestratorStage {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        store: Arc<dyn ApplicationStore>,
        engine: DecisionFusionEngine,
        required: Vec<StageId>,
    ) -> Self {
        Self {
            llm,
            store,
            engine,
            required,
        }
    }

    /// Never fails: any capability or parse problem yields `Recommendation::unavailable`.
    async fn recommend(
        &self,
        ctx: &StageContext,
        metrics: &DecisionMetrics,
        rule: &RuleOutcome,
    ) -> Recommendation {
        let metrics_json = serde_json::to_string_pretty(metrics).unwrap_or_default();
        let prompt = DECISION_PROMPT_TEMPLATE
            .replace("{title}", &ctx.job.title)
            .replace("{company}", &ctx.job.company)
            .replace("{metrics_json}", &metrics_json)
            .replace("{rule_summary}", &rule.explanation);

        let id = ctx.application.application_id;
        let text = match self.llm.invoke(&prompt, DECISION_SYSTEM).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Recommendation unavailable for {id}: {e}");
                return Recommendation::unavailable();
            }
        };

        match parse_json_response::<RawRecommendation>(&text).map(RawRecommendation::validate) {
            Ok(Some(recommendation)) => recommendation,
            Ok(None) => {
                warn!("Recommendation for {id} had an unknown decision or bad confidence");
                Recommendation::unavailable()
            }
            Err(e) => {
                warn!("Unparsable recommendation for {id}: {e}");
                Recommendation::unavailable()
            }
        }
    }
}

#[async_trait]
impl StageAgent for OrchestratorStage {
    fn stage(&self) -> StageId {
        StageId::Orchestrator
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let id = ctx.application.application_id;
        let outputs = self.store.get_stage_outputs(id).await?;

        let missing: Vec<StageId> = self
            .required
            .iter()
            .copied()
            .filter(|stage| !outputs.has_output(*stage))
            .collect();
        if !missing.is_empty() {
            return Err(StageError::MissingUpstreamStage(missing));
        }

        let metrics = extract_metrics(&outputs);
        let rule = self.engine.evaluate_rules(&metrics);
        let recommendation = self.recommend(ctx, &metrics, &rule).await;
        let record = self.engine.decide(metrics, rule, recommendation);

        info!(
            "Decision for {id}: {} (rules: {}, recommendation: {} @ {:.2})",
            record.decision.as_str(),
            record.rule_decision.as_str(),
            record.recommended_decision.as_str(),
            record.confidence
        );
        Ok(StageOutput::Orchestrator(record))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decision::{DecisionThresholds, FusionPath};
    use crate::models::ApplicationRecord;
    use crate::testing::{seed_application, InMemoryStore, ScriptedGenerator};

    const REQUIRED: [StageId; 5] = [
        StageId::JobMatcher,
        StageId::SalaryValidator,
        StageId::CvTailor,
        StageId::CoverLetterWriter,
        StageId::Qa,
    ];

    fn outputs(final_score: f64, qa_warnings: Value) -> Vec<(StageId, Value)> {
        vec![
            (
                StageId::JobMatcher,
                json!({"final_score": final_score, "found": {"location": "primary"}}),
            ),
            (
                StageId::SalaryValidator,
                json!({"meets_threshold": true, "missing": false, "exceeds_maximum": false}),
            ),
            (StageId::CvTailor, json!({"body": "cv"})),
            (StageId::CoverLetterWriter, json!({"body": "letter"})),
            (StageId::Qa, json!({"passed": true, "warnings": qa_warnings})),
        ]
    }

    fn seeded(
        store: &InMemoryStore,
        stage_outputs: Vec<(StageId, Value)>,
    ) -> ApplicationRecord {
        let mut app = seed_application(store);
        for (stage, value) in stage_outputs {
            app.complete_stage(stage, value);
        }
        store.insert_application(app.clone());
        app
    }

    async fn decide(
        generator: ScriptedGenerator,
        stage_outputs: Vec<(StageId, Value)>,
    ) -> Result<StageOutput, StageError> {
        let store = Arc::new(InMemoryStore::new());
        let application = seeded(&store, stage_outputs);
        let job = store.get_job(application.job_id).await.unwrap().unwrap();
        let stage = OrchestratorStage::new(
            Arc::new(generator),
            store,
            DecisionFusionEngine::new(DecisionThresholds::default()),
            REQUIRED.to_vec(),
        );
        stage.run(&StageContext { application, job }).await
    }

    fn recommendation(decision: &str, confidence: f64) -> String {
        json!({
            "recommended_decision": decision,
            "confidence": confidence,
            "reasoning": "strong fit",
            "flagged_concerns": []
        })
        .to_string()
    }

    fn record(result: Result<StageOutput, StageError>) -> crate::decision::DecisionRecord {
        match result {
            Ok(StageOutput::Orchestrator(record)) => record,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_extract_metrics_scales_score_and_collects_warnings() {
        let mut outputs = StageOutputs::new();
        outputs.insert(
            StageId::JobMatcher,
            json!({"final_score": 0.9, "found": {"location": "acceptable"}}),
        );
        outputs.insert(
            StageId::SalaryValidator,
            json!({"meets_threshold": false, "missing": true, "exceeds_maximum": false}),
        );
        outputs.insert(
            StageId::Qa,
            json!({"passed": true, "warnings": ["cover letter is very short"]}),
        );

        let metrics = extract_metrics(&outputs);
        assert!((metrics.match_score - 90.0).abs() < 1e-9);
        assert!(metrics.salary_passed);
        assert!(metrics.qa_passed);
        assert_eq!(
            metrics.warnings,
            vec![
                WARN_SALARY_MISSING.to_string(),
                "qa: cover letter is very short".to_string(),
                WARN_LOCATION_ACCEPTABLE.to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_metrics_defaults_to_failing_values() {
        let metrics = extract_metrics(&StageOutputs::new());
        assert_eq!(metrics.match_score, 0.0);
        assert!(!metrics.salary_passed);
        assert!(!metrics.qa_passed);
        assert!(metrics.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_agreement_at_high_confidence_auto_approves() {
        let generator = ScriptedGenerator::new()
            .respond(DECISION_SYSTEM, recommendation("auto_approve", 0.9));
        let record = record(decide(generator, outputs(0.9, json!([]))).await);

        assert_eq!(record.rule_decision, Decision::AutoApprove);
        assert_eq!(record.decision, Decision::AutoApprove);
        assert_eq!(record.fusion_path, FusionPath::Agreement);
        assert!(record.reasoning.contains("strong fit"));
    }

    #[tokio::test]
    async fn test_conflict_defers_to_human() {
        let generator = ScriptedGenerator::new()
            .respond(DECISION_SYSTEM, recommendation("needs_human_approval", 0.85));
        let record = record(decide(generator, outputs(0.9, json!([]))).await);

        assert_eq!(record.rule_decision, Decision::AutoApprove);
        assert_eq!(record.decision, Decision::NeedsHumanApproval);
        assert_eq!(record.fusion_path, FusionPath::Disagreement);
    }

    #[tokio::test]
    async fn test_capability_failure_never_auto_decides() {
        let generator = ScriptedGenerator::new().fail(DECISION_SYSTEM, "down");
        let record = record(decide(generator, outputs(0.9, json!([]))).await);

        assert_eq!(record.decision, Decision::NeedsHumanApproval);
        assert_eq!(record.confidence, 0.5);
        assert!(record.reasoning.contains("recommendation unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_label_is_treated_as_unavailable() {
        let generator =
            ScriptedGenerator::new().respond(DECISION_SYSTEM, recommendation("ship it", 0.99));
        let record = record(decide(generator, outputs(0.2, json!([]))).await);

        assert_eq!(record.rule_decision, Decision::AutoReject);
        assert_eq!(record.recommended_decision, Decision::NeedsHumanApproval);
        assert_eq!(record.decision, Decision::NeedsHumanApproval);
    }

    #[tokio::test]
    async fn test_qa_warnings_prevent_rule_auto_approve() {
        let generator = ScriptedGenerator::new()
            .respond(DECISION_SYSTEM, recommendation("auto_approve", 0.95));
        let record = record(decide(generator, outputs(0.95, json!(["tone"]))).await);

        assert_eq!(record.rule_decision, Decision::NeedsHumanApproval);
        assert_eq!(record.decision, Decision::NeedsHumanApproval);
        assert!(record.flagged_concerns.contains(&"qa: tone".to_string()));
    }

    #[tokio::test]
    async fn test_missing_upstream_refuses_to_decide() {
        let generator = ScriptedGenerator::new()
            .respond(DECISION_SYSTEM, recommendation("auto_approve", 0.9));
        let mut partial = outputs(0.9, json!([]));
        partial.retain(|(stage, _)| *stage != StageId::SalaryValidator);
        partial.push((StageId::Qa, json!({})));

        let err = decide(generator, partial).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::MissingUpstreamStage(ref stages)
                if stages == &[StageId::SalaryValidator, StageId::Qa]
        ));
    }

    #[tokio::test]
    async fn test_reads_outputs_from_store_not_context() {
        let store = Arc::new(InMemoryStore::new());
        let application = seeded(&store, outputs(0.9, json!([])));
        let job = store.get_job(application.job_id).await.unwrap().unwrap();

        // The context copy is stale; the store holds the real outputs.
        let mut stale = application.clone();
        stale.stage_outputs = StageOutputs::new();

        let stage = OrchestratorStage::new(
            Arc::new(
                ScriptedGenerator::new()
                    .respond(DECISION_SYSTEM, recommendation("auto_approve", 0.9)),
            ),
            store,
            DecisionFusionEngine::new(DecisionThresholds::default()),
            REQUIRED.to_vec(),
        );
        let result = stage
            .run(&StageContext {
                application: stale,
                job,
            })
            .await;
        assert_eq!(record(result).decision, Decision::AutoApprove);
    }
}
