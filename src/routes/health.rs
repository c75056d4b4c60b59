//! Health check endpoints for orchestrator probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness status of all dependencies.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// "ready", "degraded", or "unready"
    pub status: String,
    pub database: ComponentStatus,
    pub recall_backend: ComponentStatus,
    pub rerank_backend: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Liveness probe. Answers as long as the process is serving.
pub async fn liveness() -> impl IntoResponse {
    Json(LivenessResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe: database ping plus embedding backend probes.
///
/// The pipeline can run without embedding backends (media steps still
/// work), so backend failures degrade readiness rather than failing it.
#[tracing::instrument(name = "health.ready", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let db_healthy = state.db.health_check().await.is_ok();
    let db_latency = start.elapsed().as_millis() as u64;

    let (recall_healthy, rerank_healthy) = state.embedder.health().await;

    let status = if !db_healthy {
        "unready"
    } else if !recall_healthy || !rerank_healthy {
        "degraded"
    } else {
        "ready"
    };
    let code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadinessResponse {
            status: status.to_string(),
            database: ComponentStatus {
                healthy: db_healthy,
                latency_ms: Some(db_latency),
            },
            recall_backend: ComponentStatus {
                healthy: recall_healthy,
                latency_ms: None,
            },
            rerank_backend: ComponentStatus {
                healthy: rerank_healthy,
                latency_ms: None,
            },
        }),
    )
}
