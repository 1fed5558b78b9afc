//! Persistence collaborator interface.
//!
//! The pipeline core only reads jobs/applications and performs narrow bookkeeping writes.
//! Apart from the initial reads, callers log and swallow write failures.

pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApplicationRecord, ApplicationStatus, ErrorInfo, JobRecord, StageId, StageOutputs,
    SubmissionMethod,
};

pub use postgres::PgApplicationStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn get_application(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationRecord>, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError>;

    async fn get_stage_outputs(&self, application_id: Uuid) -> Result<StageOutputs, StoreError>;

    async fn update_current_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
    ) -> Result<(), StoreError>;

    /// Stores the stage output and appends the stage to `completed_stages` in one write.
    async fn add_completed_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
        output: &Value,
    ) -> Result<(), StoreError>;

    async fn update_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<(), StoreError>;

    /// `None` clears the error.
    async fn update_error_info(
        &self,
        application_id: Uuid,
        error: Option<&ErrorInfo>,
    ) -> Result<(), StoreError>;

    async fn set_submission_method(
        &self,
        application_id: Uuid,
        method: SubmissionMethod,
    ) -> Result<(), StoreError>;
}
