//! Admin passthroughs to the queue provider.

use axum::{
    Json,
    extract::{Path, State},
};

use super::error::ApiError;
use crate::{AppState, queue::QueueInfo};

/// `GET /api/admin/queues`: list provider queues.
#[tracing::instrument(name = "queues.list", skip(state))]
pub async fn list_queues(State(state): State<AppState>) -> Result<Json<Vec<QueueInfo>>, ApiError> {
    Ok(Json(state.queue.list_queues().await?))
}

/// `GET /api/admin/queues/{name}`: queue metadata.
#[tracing::instrument(name = "queues.get", skip(state))]
pub async fn get_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QueueInfo>, ApiError> {
    Ok(Json(state.queue.get_queue(&name).await?))
}

/// `DELETE /api/admin/queues/{name}`: delete a queue.
#[tracing::instrument(name = "queues.delete", skip(state))]
pub async fn delete_queue(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.queue.remove_queue(&name).await?;
    Ok(Json(serde_json::json!({"deleted": name})))
}
