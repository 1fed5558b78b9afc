//! Uniform execution envelope shared by every stage.
//!
//! A stage only implements `StageAgent::run`. `StageExecutor` owns the contract around it:
//! loading the application and job, marking `current_stage`, recording the output, and turning
//! every failure into an `AgentExecutionResult` instead of an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{ErrorKind, StageError};
use crate::models::{ApplicationRecord, JobRecord, StageId, StageOutput};
use crate::store::ApplicationStore;

/// Everything a stage sees about the application it is working on.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub application: ApplicationRecord,
    pub job: JobRecord,
}

#[async_trait]
pub trait StageAgent: Send + Sync {
    fn stage(&self) -> StageId;

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;

    /// Substitute output for a failed `run`. Returning `Some` turns the failure into a success.
    fn recover(&self, _error: &StageError) -> Option<StageOutput> {
        None
    }
}

/// Outcome of one stage execution. `success == false` always carries an `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentExecutionResult {
    pub success: bool,
    pub stage_name: StageId,
    pub output: Value,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: u64,
}

impl AgentExecutionResult {
    pub fn success(stage: StageId, output: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            stage_name: stage,
            output,
            error_message: None,
            error_kind: None,
            duration_ms,
        }
    }

    pub fn failure(stage: StageId, error: &StageError, duration_ms: u64) -> Self {
        Self {
            success: false,
            stage_name: stage,
            output: Value::Null,
            error_message: Some(error.to_string()),
            error_kind: Some(error.kind()),
            duration_ms,
        }
    }
}

#[derive(Clone)]
pub struct StageExecutor {
    store: Arc<dyn ApplicationStore>,
}

impl StageExecutor {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    /// Runs `agent` for one application. Never returns an error.
    pub async fn execute(
        &self,
        agent: &dyn StageAgent,
        application_id: Uuid,
    ) -> AgentExecutionResult {
        let started = Instant::now();
        let stage = agent.stage();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        let ctx = match self.load_context(application_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("Stage {stage} could not start for {application_id}: {e}");
                return AgentExecutionResult::failure(stage, &e, elapsed(started));
            }
        };

        if let Err(e) = self.store.update_current_stage(application_id, stage).await {
            warn!("Failed to mark current stage {stage} for {application_id}: {e}");
        }

        let outcome = match agent.run(&ctx).await {
            Ok(output) => Ok(output),
            Err(e) => match agent.recover(&e) {
                Some(fallback) => {
                    warn!("Stage {stage} recovered from error for {application_id}: {e}");
                    Ok(fallback)
                }
                None => Err(e),
            },
        };

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                warn!("Stage {stage} failed for {application_id}: {e}");
                return AgentExecutionResult::failure(stage, &e, elapsed(started));
            }
        };

        if output.stage() != stage {
            let e = StageError::Permanent(format!(
                "stage {stage} produced output for {}",
                output.stage()
            ));
            return AgentExecutionResult::failure(stage, &e, elapsed(started));
        }

        let value = match output.to_value() {
            Ok(value) => value,
            Err(e) => {
                let e = StageError::UnparsableResponse(format!("output not serializable: {e}"));
                return AgentExecutionResult::failure(stage, &e, elapsed(started));
            }
        };

        if let Err(e) = self
            .store
            .add_completed_stage(application_id, stage, &value)
            .await
        {
            warn!("Failed to record completed stage {stage} for {application_id}: {e}");
        }

        let duration_ms = elapsed(started);
        info!("Stage {stage} completed for {application_id} in {duration_ms}ms");
        AgentExecutionResult::success(stage, value, duration_ms)
    }

    async fn load_context(&self, application_id: Uuid) -> Result<StageContext, StageError> {
        let application = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| {
                StageError::NotFound(format!("Application {application_id} not found"))
            })?;

        let job = self
            .store
            .get_job(application.job_id)
            .await?
            .ok_or_else(|| StageError::NotFound(format!("Job {} not found", application.job_id)))?;

        Ok(StageContext { application, job })
    }
}
