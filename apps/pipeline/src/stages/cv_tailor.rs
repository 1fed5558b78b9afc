use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::StageError;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::models::{CvOutput, StageId, StageOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{CV_TAILOR_PROMPT_TEMPLATE, CV_TAILOR_SYSTEM};

pub struct CvTailorStage {
    llm: Arc<dyn TextGenerator>,
    profile: Arc<str>,
}

impl CvTailorStage {
    pub fn new(llm: Arc<dyn TextGenerator>, profile: Arc<str>) -> Self {
        Self { llm, profile }
    }

    fn build_prompt(&self, ctx: &StageContext) -> String {
        let matched = ctx
            .application
            .stage_outputs
            .job_match()
            .map(|m| {
                json!({
                    "must_have": m.found.must_have,
                    "strong_preference": m.found.strong_preference,
                    "nice_to_have": m.found.nice_to_have,
                })
            })
            .unwrap_or_else(|| json!({}));

        CV_TAILOR_PROMPT_TEMPLATE
            .replace("{title}", &ctx.job.title)
            .replace("{company}", &ctx.job.company)
            .replace("{description}", &ctx.job.description)
            .replace("{matched_json}", &matched.to_string())
            .replace("{profile}", &self.profile)
            .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
    }
}

#[async_trait]
impl StageAgent for CvTailorStage {
    fn stage(&self) -> StageId {
        StageId::CvTailor
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let text = self
            .llm
            .invoke(&self.build_prompt(ctx), CV_TAILOR_SYSTEM)
            .await?;

        let cv = parse_json_response::<CvOutput>(&text).unwrap_or_else(|e| {
            warn!(
                "Unstructured CV for {}, keeping raw text: {e}",
                ctx.application.application_id
            );
            CvOutput {
                body: text.trim().to_string(),
                ..CvOutput::default()
            }
        });

        info!(
            "Tailored CV for {} ({} chars, {} highlighted skills)",
            ctx.application.application_id,
            cv.body.len(),
            cv.highlighted_skills.len()
        );
        Ok(StageOutput::CvTailor(cv))
    }
}
