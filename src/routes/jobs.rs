//! Processing job endpoints: create, status, cancel.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    AppState,
    models::{CreateProcessingJob, ProcessingJob, ProcessingJobStep},
};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub attachment_id: Uuid,
    pub user_id: Uuid,
    pub source_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub job: ProcessingJob,
    pub steps: Vec<ProcessingJobStep>,
}

/// `POST /api/pipeline/jobs`: create a job and enqueue its first step.
///
/// 202 for a new job, 200 when the attachment already has an active job.
#[tracing::instrument(name = "jobs.create", skip(state, request), fields(attachment_id = %request.attachment_id))]
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.source_url.is_empty() {
        return Err(ApiError::Validation("source_url cannot be empty".to_string()));
    }

    let (job, created) = state
        .pipeline
        .start_job(CreateProcessingJob {
            attachment_id: request.attachment_id,
            user_id: request.user_id,
            source_url: request.source_url,
            max_retries: request.max_retries,
        })
        .await?;

    let code = if created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((code, Json(job)))
}

/// `GET /api/pipeline/jobs/{id}`: job status including per-step records.
#[tracing::instrument(name = "jobs.get", skip(state))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let (job, steps) = state.pipeline.status(id).await?;
    Ok(Json(JobStatusResponse { job, steps }))
}

/// `DELETE /api/pipeline/jobs/{id}`: cancel a job. 409 when terminal.
#[tracing::instrument(name = "jobs.cancel", skip(state))]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.pipeline.cancel(id).await?;
    Ok(Json(serde_json::json!({
        "status": "cancelled",
        "job_id": job.id,
        "cancelled_at": job.cancelled_at,
    })))
}
