//! Pipeline runner: drives one application through the remaining stages in order.
//!
//! Stages for one application run strictly sequentially. The runner owns every status
//! transition; stages only produce outputs. Bookkeeping writes are logged and swallowed,
//! while the runner keeps a local mirror of the record so a storage hiccup never changes
//! the outcome it reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::decision::Decision;
use crate::errors::{ErrorKind, PipelineError};
use crate::models::{
    stage_entry_status, ApplicationRecord, ApplicationStatus, ErrorInfo, StageId,
};
use crate::pipeline::agent::{StageAgent, StageExecutor};
use crate::pipeline::definition::PipelineDefinition;
use crate::store::ApplicationStore;

/// Result of one `process` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub application_id: Uuid,
    pub status: ApplicationStatus,
    /// Every stage the record has completed so far, in order.
    pub stages_completed: Vec<StageId>,
    /// Stages completed during this call, in order.
    pub stages_run: Vec<StageId>,
    pub error: Option<String>,
}

/// Whether a record in `status` may run `stage` next.
fn accepts(stage: StageId, status: ApplicationStatus) -> bool {
    match stage {
        StageId::JobMatcher => matches!(
            status,
            ApplicationStatus::Discovered | ApplicationStatus::Queued
        ),
        StageId::Submission => matches!(
            status,
            ApplicationStatus::Approved | ApplicationStatus::ReadyToSend
        ),
        other => status == stage_entry_status(other),
    }
}

/// Status a record moves to after `stage` fails with `kind`.
fn failure_status(stage: StageId, kind: ErrorKind) -> ApplicationStatus {
    match (stage, kind) {
        (_, ErrorKind::NotFound | ErrorKind::Permanent) => ApplicationStatus::Failed,
        (StageId::Submission, _) => ApplicationStatus::SubmissionFailed,
        _ => ApplicationStatus::Pending,
    }
}

/// Status a record moves to after `stage` succeeds, if any.
fn status_after(stage: StageId, record: &ApplicationRecord) -> Option<ApplicationStatus> {
    match stage {
        StageId::JobMatcher => {
            let approved = record
                .stage_outputs
                .job_match()
                .map(|m| m.score.approved)
                .unwrap_or(false);
            Some(if approved {
                ApplicationStatus::Matched
            } else {
                ApplicationStatus::Rejected
            })
        }
        StageId::Qa => Some(ApplicationStatus::DocumentsGenerated),
        StageId::Orchestrator => {
            let decision = record
                .stage_outputs
                .decision()
                .map(|d| d.decision)
                .unwrap_or(Decision::NeedsHumanApproval);
            Some(match decision {
                Decision::AutoApprove => ApplicationStatus::Approved,
                Decision::NeedsHumanApproval => ApplicationStatus::PendingApproval,
                Decision::AutoReject => ApplicationStatus::Rejected,
            })
        }
        StageId::Submission => Some(ApplicationStatus::Completed),
        StageId::SalaryValidator | StageId::CvTailor | StageId::CoverLetterWriter => None,
    }
}

pub struct Pipeline {
    store: Arc<dyn ApplicationStore>,
    definition: PipelineDefinition,
    agents: HashMap<StageId, Arc<dyn StageAgent>>,
    executor: StageExecutor,
}

impl Pipeline {
    /// Fails if a stage in `definition` has no agent.
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        definition: PipelineDefinition,
        agents: HashMap<StageId, Arc<dyn StageAgent>>,
    ) -> Result<Self, PipelineError> {
        if let Some(stage) = definition.stage_ids().find(|s| !agents.contains_key(s)) {
            return Err(PipelineError::Definition(format!(
                "no agent registered for stage '{stage}'"
            )));
        }

        for stage in agents.keys().filter(|s| !definition.contains(**s)) {
            warn!("Agent for stage '{stage}' is not part of the pipeline and will never run");
        }

        Ok(Self {
            executor: StageExecutor::new(store.clone()),
            store,
            definition,
            agents,
        })
    }

    pub async fn get(&self, application_id: Uuid) -> Result<ApplicationRecord, PipelineError> {
        self.store
            .get_application(application_id)
            .await?
            .ok_or(PipelineError::ApplicationNotFound(application_id))
    }

    /// Runs every remaining stage until the pipeline finishes, fails, or waits on a human.
    pub async fn process(&self, application_id: Uuid) -> Result<ProcessSummary, PipelineError> {
        let mut record = self.get(application_id).await?;
        let mut stages_run = Vec::new();
        let mut error = None;

        info!(
            "Processing application {application_id} from status {}",
            record.status
        );

        for stage in self.definition.stage_ids() {
            if record.has_completed(stage) {
                continue;
            }
            if record.status.is_terminal() || !accepts(stage, record.status) {
                break;
            }
            let Some(agent) = self.agents.get(&stage) else {
                return Err(PipelineError::Definition(format!(
                    "no agent registered for stage '{stage}'"
                )));
            };

            if stage == StageId::Submission {
                self.transition(&mut record, ApplicationStatus::Sending)
                    .await?;
            }

            let result = self.executor.execute(agent.as_ref(), application_id).await;

            if !result.success {
                let kind = result.error_kind.unwrap_or(ErrorKind::Permanent);
                let message = result
                    .error_message
                    .unwrap_or_else(|| format!("stage {stage} failed"));
                let info = ErrorInfo {
                    stage,
                    kind,
                    message: message.clone(),
                    occurred_at: Utc::now(),
                };

                if let Err(e) = self.store.update_error_info(application_id, Some(&info)).await {
                    warn!("Failed to record error for {application_id}: {e}");
                }
                record.error_info = Some(info);
                self.transition(&mut record, failure_status(stage, kind))
                    .await?;
                error = Some(message);
                break;
            }

            record.complete_stage(stage, result.output);
            stages_run.push(stage);

            if let Some(next) = status_after(stage, &record) {
                self.transition(&mut record, next).await?;
            }
        }

        info!(
            "Application {application_id} now {} after {} stage(s)",
            record.status,
            stages_run.len()
        );

        Ok(ProcessSummary {
            application_id,
            status: record.status,
            stages_completed: record.completed_stages,
            stages_run,
            error,
        })
    }

    /// Marks a freshly discovered application as queued. Other statuses are left alone.
    pub async fn mark_queued(
        &self,
        application_id: Uuid,
    ) -> Result<ApplicationStatus, PipelineError> {
        let mut record = self.get(application_id).await?;
        if record.status == ApplicationStatus::Discovered {
            self.transition(&mut record, ApplicationStatus::Queued)
                .await?;
        }
        Ok(record.status)
    }

    /// Manual retry: clears the error and resets the status so the record re-enters at the
    /// stage that failed.
    pub async fn retry(&self, application_id: Uuid) -> Result<ApplicationRecord, PipelineError> {
        let mut record = self.get(application_id).await?;
        if !record.status.is_retryable() {
            return Err(PipelineError::NotRetryable(record.status));
        }

        let target = record.reentry_status();
        self.store.update_error_info(application_id, None).await?;
        self.store.update_status(application_id, target).await?;

        info!(
            "Application {application_id} reset from {} to {target} for retry",
            record.status
        );
        record.error_info = None;
        record.status = target;
        Ok(record)
    }

    /// Human decision on a record waiting in `pending_approval`.
    pub async fn resolve_approval(
        &self,
        application_id: Uuid,
        approve: bool,
    ) -> Result<ApplicationRecord, PipelineError> {
        let mut record = self.get(application_id).await?;
        if record.status != ApplicationStatus::PendingApproval {
            return Err(PipelineError::NotAwaitingApproval(record.status));
        }

        let target = if approve {
            ApplicationStatus::Approved
        } else {
            ApplicationStatus::Rejected
        };
        self.store.update_status(application_id, target).await?;

        info!("Application {application_id} {target} by reviewer");
        record.status = target;
        Ok(record)
    }

    /// Checked transition. The store write is bookkeeping and never fails the call.
    async fn transition(
        &self,
        record: &mut ApplicationRecord,
        next: ApplicationStatus,
    ) -> Result<(), PipelineError> {
        if !record.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        if let Err(e) = self.store.update_status(record.application_id, next).await {
            warn!(
                "Failed to persist status {next} for {}: {e}",
                record.application_id
            );
        }
        record.status = next;
        Ok(())
    }
}
