//! Segment search endpoint.

use axum::{Json, extract::State};
use serde::Serialize;

use super::error::ApiError;
use crate::{
    AppState,
    search::{RankedSegment, SegmentQuery},
};

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedSegment>,
    /// Whether the rerank stage ran.
    pub reranked: bool,
}

/// `POST /api/search/segments`: two-stage search over video segments.
#[tracing::instrument(name = "search.segments", skip(state, query))]
pub async fn search_segments(
    State(state): State<AppState>,
    Json(query): Json<SegmentQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let reranked = query.rerank_vector.is_some();
    let results = state.search.search(query).await?;
    Ok(Json(SearchResponse { results, reranked }))
}
