//! PostgreSQL binding of the persistence collaborator.
//!
//! Expected tables:
//! - `jobs (job_id uuid pk, title, company, location, description, salary, salary_period,
//!   apply_email, apply_url, source_url, discovered_at)`
//! - `applications (application_id uuid pk, job_id uuid, status text, current_stage text,
//!   completed_stages text[], stage_outputs jsonb, error_info jsonb, submission_method text,
//!   created_at, updated_at)`

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{ApplicationStore, StoreError};
use crate::models::{
    ApplicationRecord, ApplicationStatus, ErrorInfo, JobRecord, SalaryPeriod, StageId,
    StageOutputs, SubmissionMethod,
};

#[derive(Debug, FromRow)]
struct JobRow {
    job_id: Uuid,
    title: String,
    company: String,
    location: Option<String>,
    description: String,
    salary: Option<String>,
    salary_period: Option<String>,
    apply_email: Option<String>,
    apply_url: Option<String>,
    source_url: Option<String>,
    discovered_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    application_id: Uuid,
    job_id: Uuid,
    status: String,
    current_stage: Option<String>,
    completed_stages: Vec<String>,
    stage_outputs: Value,
    error_info: Option<Value>,
    submission_method: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let salary_period = row
            .salary_period
            .as_deref()
            .map(|p| serde_json::from_value::<SalaryPeriod>(Value::String(p.to_string())))
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("job {}: salary_period: {e}", row.job_id)))?;

        Ok(JobRecord {
            job_id: row.job_id,
            title: row.title,
            company: row.company,
            location: row.location,
            description: row.description,
            salary: row.salary,
            salary_period,
            apply_email: row.apply_email,
            apply_url: row.apply_url,
            source_url: row.source_url,
            discovered_at: row.discovered_at,
        })
    }
}

impl TryFrom<ApplicationRow> for ApplicationRecord {
    type Error = StoreError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        let id = row.application_id;
        let corrupt = |field: &str, e: String| {
            StoreError::Corrupt(format!("application {id}: {field}: {e}"))
        };

        let status = row
            .status
            .parse::<ApplicationStatus>()
            .map_err(|e| corrupt("status", e))?;
        let current_stage = row
            .current_stage
            .as_deref()
            .map(str::parse::<StageId>)
            .transpose()
            .map_err(|e| corrupt("current_stage", e))?;
        let completed_stages = row
            .completed_stages
            .iter()
            .map(|s| s.parse::<StageId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| corrupt("completed_stages", e))?;
        let stage_outputs =
            decode_outputs(row.stage_outputs).map_err(|e| corrupt("stage_outputs", e))?;
        let error_info = row
            .error_info
            .map(serde_json::from_value::<ErrorInfo>)
            .transpose()
            .map_err(|e| corrupt("error_info", e.to_string()))?;
        let submission_method = row
            .submission_method
            .as_deref()
            .map(str::parse::<SubmissionMethod>)
            .transpose()
            .map_err(|e| corrupt("submission_method", e))?;

        Ok(ApplicationRecord {
            application_id: id,
            job_id: row.job_id,
            status,
            current_stage,
            completed_stages,
            stage_outputs,
            error_info,
            submission_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Decodes the JSONB object of stage outputs. Keys that are not known stages are skipped.
fn decode_outputs(value: Value) -> Result<StageOutputs, String> {
    match value {
        Value::Null => Ok(StageOutputs::new()),
        Value::Object(map) => {
            let mut outputs = BTreeMap::new();
            for (key, output) in map {
                match key.parse::<StageId>() {
                    Ok(stage) => {
                        outputs.insert(stage, output);
                    }
                    Err(_) => debug!("Ignoring output for unknown stage '{key}'"),
                }
            }
            Ok(StageOutputs::from(outputs))
        }
        other => Err(format!("expected object, got {other}")),
    }
}

#[derive(Clone)]
pub struct PgApplicationStore {
    pool: PgPool,
}

impl PgApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_updated(application_id: Uuid, rows: u64) -> Result<(), StoreError> {
        if rows == 0 {
            Err(StoreError::NotFound(format!("application {application_id}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn get_application(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT application_id, job_id, status, current_stage, completed_stages,
                   stage_outputs, error_info, submission_method, created_at, updated_at
            FROM applications
            WHERE application_id = $1
            "#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApplicationRecord::try_from).transpose()
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, title, company, location, description, salary, salary_period,
                   apply_email, apply_url, source_url, discovered_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRecord::try_from).transpose()
    }

    async fn get_stage_outputs(&self, application_id: Uuid) -> Result<StageOutputs, StoreError> {
        let value: Option<Value> = sqlx::query_scalar(
            "SELECT stage_outputs FROM applications WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;

        let value =
            value.ok_or_else(|| StoreError::NotFound(format!("application {application_id}")))?;
        decode_outputs(value).map_err(StoreError::Corrupt)
    }

    async fn update_current_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET current_stage = $2, updated_at = NOW()
            WHERE application_id = $1
            "#,
        )
        .bind(application_id)
        .bind(stage.as_str())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(application_id, result.rows_affected())
    }

    async fn add_completed_stage(
        &self,
        application_id: Uuid,
        stage: StageId,
        output: &Value,
    ) -> Result<(), StoreError> {
        // Single statement: the output and the completed-stage append land together or not at all.
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET stage_outputs = COALESCE(stage_outputs, '{}'::jsonb)
                    || jsonb_build_object($2::text, $3::jsonb),
                completed_stages = CASE
                    WHEN $2 = ANY(completed_stages) THEN completed_stages
                    ELSE array_append(completed_stages, $2)
                END,
                updated_at = NOW()
            WHERE application_id = $1
            "#,
        )
        .bind(application_id)
        .bind(stage.as_str())
        .bind(output)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(application_id, result.rows_affected())
    }

    async fn update_status(
        &self,
        application_id: Uuid,
        status: ApplicationStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE applications SET status = $2, updated_at = NOW() WHERE application_id = $1",
        )
        .bind(application_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(application_id, result.rows_affected())
    }

    async fn update_error_info(
        &self,
        application_id: Uuid,
        error: Option<&ErrorInfo>,
    ) -> Result<(), StoreError> {
        let value = error
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("error_info: {e}")))?;

        let result = sqlx::query(
            "UPDATE applications SET error_info = $2, updated_at = NOW() WHERE application_id = $1",
        )
        .bind(application_id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(application_id, result.rows_affected())
    }

    async fn set_submission_method(
        &self,
        application_id: Uuid,
        method: SubmissionMethod,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET submission_method = $2, updated_at = NOW()
            WHERE application_id = $1
            "#,
        )
        .bind(application_id)
        .bind(method.as_str())
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(application_id, result.rows_affected())
    }
}
