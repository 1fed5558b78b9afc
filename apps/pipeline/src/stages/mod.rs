pub mod cover_letter_writer;
pub mod cv_tailor;
pub mod job_matcher;
pub mod orchestrator;
pub mod prompts;
pub mod qa;
pub mod salary_validator;
pub mod submission;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::decision::DecisionFusionEngine;
use crate::llm_client::TextGenerator;
use crate::matching::JobMatchScorer;
use crate::models::StageId;
use crate::pipeline::{PipelineDefinition, StageAgent};
use crate::resilience::{ChannelLimiters, RetryExecutor};
use crate::store::ApplicationStore;
use crate::submission::SubmissionChannel;

pub use cover_letter_writer::CoverLetterWriterStage;
pub use cv_tailor::CvTailorStage;
pub use job_matcher::JobMatcherStage;
pub use orchestrator::OrchestratorStage;
pub use qa::QaStage;
pub use salary_validator::SalaryValidatorStage;
pub use submission::SubmissionStage;

/// Collaborators shared by the stage agents.
#[derive(Clone)]
pub struct StageDeps {
    pub llm: Arc<dyn TextGenerator>,
    pub store: Arc<dyn ApplicationStore>,
    pub submission: Arc<dyn SubmissionChannel>,
    pub limiters: ChannelLimiters,
    pub candidate_profile: Arc<str>,
    pub config: PipelineConfig,
}

/// Builds one agent per stage in `definition`.
///
/// The orchestrator's required upstream stages come from the definition's edges.
pub fn build_agents(
    definition: &PipelineDefinition,
    deps: &StageDeps,
) -> HashMap<StageId, Arc<dyn StageAgent>> {
    let config = &deps.config;

    definition
        .stage_ids()
        .map(|stage| {
            let agent: Arc<dyn StageAgent> = match stage {
                StageId::JobMatcher => Arc::new(JobMatcherStage::new(
                    deps.llm.clone(),
                    JobMatchScorer::new(config.criteria.clone(), config.match_threshold),
                )),
                StageId::SalaryValidator => {
                    Arc::new(SalaryValidatorStage::new(deps.llm.clone(), config.salary))
                }
                StageId::CvTailor => Arc::new(CvTailorStage::new(
                    deps.llm.clone(),
                    deps.candidate_profile.clone(),
                )),
                StageId::CoverLetterWriter => {
                    Arc::new(CoverLetterWriterStage::new(deps.llm.clone()))
                }
                StageId::Qa => Arc::new(QaStage::new(deps.llm.clone())),
                StageId::Orchestrator => Arc::new(OrchestratorStage::new(
                    deps.llm.clone(),
                    deps.store.clone(),
                    DecisionFusionEngine::new(config.decision),
                    definition.requirements(StageId::Orchestrator).to_vec(),
                )),
                StageId::Submission => Arc::new(SubmissionStage::new(
                    deps.submission.clone(),
                    deps.limiters.clone(),
                    RetryExecutor::new(config.retry.clone()),
                    deps.store.clone(),
                )),
            };
            (stage, agent)
        })
        .collect()
}
