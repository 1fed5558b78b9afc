use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::StageError;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::models::{CoverLetterOutput, StageId, StageOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM};

pub struct CoverLetterWriterStage {
    llm: Arc<dyn TextGenerator>,
}

impl CoverLetterWriterStage {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl StageAgent for CoverLetterWriterStage {
    fn stage(&self) -> StageId {
        StageId::CoverLetterWriter
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let cv = ctx
            .application
            .stage_outputs
            .cv()
            .ok_or_else(|| StageError::MissingUpstreamStage(vec![StageId::CvTailor]))?;

        let prompt = COVER_LETTER_PROMPT_TEMPLATE
            .replace("{title}", &ctx.job.title)
            .replace("{company}", &ctx.job.company)
            .replace("{description}", &ctx.job.description)
            .replace("{cv_summary}", &cv.summary)
            .replace("{skills}", &cv.highlighted_skills.join(", "))
            .replace("{grounding_instruction}", GROUNDING_INSTRUCTION);

        let text = self.llm.invoke(&prompt, COVER_LETTER_SYSTEM).await?;

        let letter = parse_json_response::<CoverLetterOutput>(&text).unwrap_or_else(|e| {
            warn!(
                "Unstructured cover letter for {}, keeping raw text: {e}",
                ctx.application.application_id
            );
            CoverLetterOutput {
                body: text.trim().to_string(),
            }
        });

        info!(
            "Cover letter written for {} ({} chars)",
            ctx.application.application_id,
            letter.body.len()
        );
        Ok(StageOutput::CoverLetterWriter(letter))
    }
}
