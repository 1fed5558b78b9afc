use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::StageError;
use crate::llm_client::{parse_json_response, TextGenerator};
use crate::matching::{FoundItems, JobMatchScorer, LocationTier};
use crate::models::{MatchOutput, StageId, StageOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::stages::prompts::{JOB_MATCH_PROMPT_TEMPLATE, JOB_MATCH_SYSTEM};

/// Classification as returned by the model. The location tier arrives as free text.
#[derive(Debug, Default, Deserialize)]
struct RawFound {
    #[serde(default)]
    must_have: Vec<String>,
    #[serde(default)]
    strong_preference: Vec<String>,
    #[serde(default)]
    nice_to_have: Vec<String>,
    #[serde(default)]
    location: Option<String>,
}

impl From<RawFound> for FoundItems {
    fn from(raw: RawFound) -> Self {
        FoundItems {
            must_have: raw.must_have,
            strong_preference: raw.strong_preference,
            nice_to_have: raw.nice_to_have,
            location: raw
                .location
                .as_deref()
                .map(LocationTier::from_label)
                .unwrap_or_default(),
        }
    }
}

pub struct JobMatcherStage {
    llm: Arc<dyn TextGenerator>,
    scorer: JobMatchScorer,
}

impl JobMatcherStage {
    pub fn new(llm: Arc<dyn TextGenerator>, scorer: JobMatchScorer) -> Self {
        Self { llm, scorer }
    }

    fn build_prompt(&self, ctx: &StageContext) -> String {
        let criteria = self.scorer.criteria();
        let criteria_json = json!({
            "must_have": criteria.must_have,
            "strong_preference": criteria.strong_preference,
            "nice_to_have": criteria.nice_to_have,
            "location": {
                "primary": criteria.location.primary,
                "acceptable": criteria.location.acceptable,
            },
        });

        JOB_MATCH_PROMPT_TEMPLATE
            .replace("{title}", &ctx.job.title)
            .replace("{company}", &ctx.job.company)
            .replace("{location}", ctx.job.location.as_deref().unwrap_or("not stated"))
            .replace("{description}", &ctx.job.description)
            .replace("{criteria_json}", &criteria_json.to_string())
    }
}

#[async_trait]
impl StageAgent for JobMatcherStage {
    fn stage(&self) -> StageId {
        StageId::JobMatcher
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let text = self
            .llm
            .invoke(&self.build_prompt(ctx), JOB_MATCH_SYSTEM)
            .await?;

        // An unreadable classification scores as "nothing found" rather than failing the stage.
        let found: FoundItems = match parse_json_response::<RawFound>(&text) {
            Ok(raw) => raw.into(),
            Err(e) => {
                warn!(
                    "Unparsable match classification for {}: {e}",
                    ctx.application.application_id
                );
                FoundItems::default()
            }
        };

        let score = self.scorer.score(&found);
        info!(
            "Job {} scored {:.3} (threshold {:.2}, approved: {})",
            ctx.job.job_id,
            score.final_score,
            self.scorer.threshold(),
            score.approved
        );

        Ok(StageOutput::JobMatcher(MatchOutput {
            score,
            threshold: self.scorer.threshold(),
            found,
        }))
    }
}
