//! Queue callback endpoints, one per pipeline step.
//!
//! These are invoked by the queue provider, not by users. Handlers are
//! idempotent and answer 2xx for no-op deliveries so the provider stops
//! redelivering.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use super::error::ApiError;
use crate::{AppState, models::PipelineStep, pipeline::{StepOutcome, StepPayload}};

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
}

/// `POST /api/pipeline/steps/{step}`: execute one step of a job.
///
/// The path step must match the payload's tag; a mismatch means the
/// message was routed to the wrong endpoint and is rejected.
#[tracing::instrument(name = "steps.handle", skip(state, payload), fields(job_id = %payload.context().queue_id))]
pub async fn handle_step(
    State(state): State<AppState>,
    Path(step): Path<String>,
    Json(payload): Json<StepPayload>,
) -> Result<Json<StepResponse>, ApiError> {
    let path_step: PipelineStep = step
        .parse()
        .map_err(|e: String| ApiError::Validation(e))?;
    if path_step != payload.step() {
        return Err(ApiError::Validation(format!(
            "Payload step '{}' does not match endpoint '{}'",
            payload.step().as_str(),
            path_step.as_str()
        )));
    }

    let outcome = state.pipeline.handle_step(payload).await?;
    let response = match outcome {
        StepOutcome::Advanced(next) => StepResponse {
            outcome: "advanced",
            next_step: Some(next.as_str()),
            retry: None,
        },
        StepOutcome::Completed => StepResponse {
            outcome: "completed",
            next_step: None,
            retry: None,
        },
        StepOutcome::Retried { retry } => StepResponse {
            outcome: "retried",
            next_step: None,
            retry: Some(retry),
        },
        StepOutcome::Failed => StepResponse {
            outcome: "failed",
            next_step: None,
            retry: None,
        },
        StepOutcome::Noop => StepResponse {
            outcome: "noop",
            next_step: None,
            retry: None,
        },
    };
    Ok(Json(response))
}
