use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::models::{ApplicationStatus, StageId};
use crate::resilience::Retryable;
use crate::store::StoreError;
use crate::submission::SubmissionError;

/// Closed classification of stage failures, persisted inside `error_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    MissingUpstreamStage,
    ExternalCapability,
    UnparsableResponse,
    TransientIo,
    Permanent,
    Store,
}

/// Failure raised inside a stage agent. Never escapes the stage envelope:
/// `StageExecutor` turns it into a failed `AgentExecutionResult`.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing upstream stage output: {}", join_stages(.0))]
    MissingUpstreamStage(Vec<StageId>),

    #[error("External capability error: {0}")]
    ExternalCapability(String),

    #[error("Unparsable response: {0}")]
    UnparsableResponse(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::NotFound(_) => ErrorKind::NotFound,
            StageError::MissingUpstreamStage(_) => ErrorKind::MissingUpstreamStage,
            StageError::ExternalCapability(_) => ErrorKind::ExternalCapability,
            StageError::UnparsableResponse(_) => ErrorKind::UnparsableResponse,
            StageError::TransientIo(_) => ErrorKind::TransientIo,
            StageError::Permanent(_) => ErrorKind::Permanent,
            StageError::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<LlmError> for StageError {
    fn from(err: LlmError) -> Self {
        StageError::ExternalCapability(err.to_string())
    }
}

/// Exhausted transient failures stay transient; everything else is permanent.
impl From<SubmissionError> for StageError {
    fn from(err: SubmissionError) -> Self {
        if err.is_retryable() {
            StageError::TransientIo(err.to_string())
        } else {
            StageError::Permanent(err.to_string())
        }
    }
}

fn join_stages(stages: &[StageId]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by the pipeline runner (outside any single stage).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Application {0} not found")]
    ApplicationNotFound(Uuid),

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("Application in status {0} cannot be retried")]
    NotRetryable(ApplicationStatus),

    #[error("Application in status {0} is not awaiting approval")]
    NotAwaitingApproval(ApplicationStatus),

    #[error("Invalid pipeline definition: {0}")]
    Definition(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// HTTP-facing error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ApplicationNotFound(id) => {
                AppError::NotFound(format!("Application {id} not found"))
            }
            PipelineError::InvalidTransition { .. }
            | PipelineError::NotRetryable(_)
            | PipelineError::NotAwaitingApproval(_) => AppError::Conflict(err.to_string()),
            PipelineError::Store(e) => AppError::Store(e),
            PipelineError::Definition(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Queue(e) => {
                tracing::error!("Queue error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_ERROR",
                    "The work queue is unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_upstream_message_lists_stages() {
        let err = StageError::MissingUpstreamStage(vec![StageId::Qa, StageId::SalaryValidator]);
        assert_eq!(
            err.to_string(),
            "Missing upstream stage output: qa, salary_validator"
        );
        assert_eq!(err.kind(), ErrorKind::MissingUpstreamStage);
    }

    #[test]
    fn test_llm_error_maps_to_external_capability() {
        let err: StageError = LlmError::EmptyContent.into();
        assert_eq!(err.kind(), ErrorKind::ExternalCapability);
    }

    #[test]
    fn test_submission_errors_split_transient_and_permanent() {
        let transient: StageError = SubmissionError::Timeout.into();
        assert_eq!(transient.kind(), ErrorKind::TransientIo);

        let permanent: StageError = SubmissionError::Auth("bad key".to_string()).into();
        assert_eq!(permanent.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn test_pipeline_not_found_maps_to_404() {
        let err: AppError = PipelineError::ApplicationNotFound(Uuid::nil()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_not_retryable_maps_to_conflict() {
        let err: AppError = PipelineError::NotRetryable(ApplicationStatus::Completed).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
