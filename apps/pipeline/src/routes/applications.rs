use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ApplicationRecord, ApplicationStatus};
use crate::pipeline::ProcessSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ApprovalRequest {
    pub approve: bool,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub application_id: Uuid,
    pub status: ApplicationStatus,
    pub queued: bool,
}

/// GET /api/v1/applications/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationRecord>, AppError> {
    Ok(Json(state.pipeline.get(id).await?))
}

/// POST /api/v1/applications/:id/process
/// Runs the remaining stages in the request and returns the summary.
pub async fn handle_process(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProcessSummary>, AppError> {
    Ok(Json(state.pipeline.process(id).await?))
}

/// POST /api/v1/applications/:id/enqueue
pub async fn handle_enqueue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    let status = state.pipeline.mark_queued(id).await?;
    if status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Application {id} is {status} and cannot be queued"
        )));
    }
    state.queue.enqueue(id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            application_id: id,
            status,
            queued: true,
        }),
    ))
}

/// POST /api/v1/applications/:id/retry
pub async fn handle_retry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationRecord>, AppError> {
    Ok(Json(state.pipeline.retry(id).await?))
}

/// POST /api/v1/applications/:id/approval
pub async fn handle_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<ApplicationRecord>, AppError> {
    Ok(Json(state.pipeline.resolve_approval(id, req.approve).await?))
}
