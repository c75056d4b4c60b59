//! Embedding queue endpoints: enqueue, manual drain, status.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;

use super::error::ApiError;
use crate::{
    AppState,
    embeddings::run_embedding_batch,
    models::{EmbeddingQueueCounts, EmbeddingQueueItem, QueueEmbeddingInput},
};

/// `POST /api/embeddings/queue`: enqueue content for embedding.
///
/// Upsert semantics: re-submitting unchanged content is a no-op.
#[tracing::instrument(name = "embeddings.enqueue", skip(state, input), fields(content_id = %input.content_id))]
pub async fn enqueue(
    State(state): State<AppState>,
    Json(input): Json<QueueEmbeddingInput>,
) -> Result<impl IntoResponse, ApiError> {
    if input.content_text.trim().is_empty() {
        return Err(ApiError::Validation(
            "content_text cannot be empty".to_string(),
        ));
    }
    let item: EmbeddingQueueItem = state.db.embedding_queue().upsert_item(input).await?;
    Ok((StatusCode::ACCEPTED, Json(item)))
}

/// `POST /api/embeddings/queue/run`: process one batch immediately.
#[tracing::instrument(name = "embeddings.run", skip(state))]
pub async fn run_batch(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = run_embedding_batch(&state.db, &state.embedder, &state.config.embeddings.queue)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(result))
}

/// `GET /api/embeddings/queue/status`: item counts by status.
#[tracing::instrument(name = "embeddings.status", skip(state))]
pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<EmbeddingQueueCounts>, ApiError> {
    let counts = state.db.embedding_queue().counts().await?;
    Ok(Json(counts))
}
