use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::errors::StageError;
use crate::models::{JobRecord, StageId, StageOutput, SubmissionMethod, SubmissionOutput};
use crate::pipeline::{StageAgent, StageContext};
use crate::resilience::{ChannelLimiters, RetryExecutor};
use crate::store::ApplicationStore;
use crate::submission::{SubmissionChannel, SubmissionPacket};

/// Email wins over a web form when the posting offers both.
pub fn choose_method(job: &JobRecord) -> Option<(SubmissionMethod, String)> {
    let present = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    present(&job.apply_email)
        .map(|email| (SubmissionMethod::Email, email))
        .or_else(|| present(&job.apply_url).map(|url| (SubmissionMethod::WebForm, url)))
}

pub struct SubmissionStage {
    channel: Arc<dyn SubmissionChannel>,
    limiters: ChannelLimiters,
    retry: RetryExecutor,
    store: Arc<dyn ApplicationStore>,
}

impl SubmissionStage {
    pub fn new(
        channel: Arc<dyn SubmissionChannel>,
        limiters: ChannelLimiters,
        retry: RetryExecutor,
        store: Arc<dyn ApplicationStore>,
    ) -> Self {
        Self {
            channel,
            limiters,
            retry,
            store,
        }
    }
}

#[async_trait]
impl StageAgent for SubmissionStage {
    fn stage(&self) -> StageId {
        StageId::Submission
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let id = ctx.application.application_id;
        let (method, recipient) = choose_method(&ctx.job).ok_or_else(|| {
            StageError::Permanent(format!("job {} has no apply email or URL", ctx.job.job_id))
        })?;

        if let Err(e) = self.store.set_submission_method(id, method).await {
            warn!("Failed to record submission method for {id}: {e}");
        }

        let outputs = &ctx.application.stage_outputs;
        let (cv, letter) = match (outputs.cv(), outputs.cover_letter()) {
            (Some(cv), Some(letter)) => (cv, letter),
            (cv, _) => {
                let missing = if cv.is_none() {
                    StageId::CvTailor
                } else {
                    StageId::CoverLetterWriter
                };
                return Err(StageError::MissingUpstreamStage(vec![missing]));
            }
        };

        let packet = SubmissionPacket {
            application_id: id,
            job_id: ctx.job.job_id,
            method,
            recipient: recipient.clone(),
            company: ctx.job.company.clone(),
            job_title: ctx.job.title.clone(),
            cv: cv.body,
            cover_letter: letter.body,
        };

        let limiter = self.limiters.for_submission(method);
        let channel = &self.channel;
        let packet = &packet;
        let receipt = self
            .retry
            .run("submission", move || async move {
                limiter.acquire().await;
                channel.submit(packet).await
            })
            .await?;
        limiter.record_success().await;

        info!(
            "Submitted {id} via {} to {recipient} (reference: {:?})",
            method.as_str(),
            receipt.reference
        );
        Ok(StageOutput::Submission(SubmissionOutput {
            method,
            recipient,
            reference: receipt.reference,
            submitted_at: Utc::now(),
        }))
    }
}
