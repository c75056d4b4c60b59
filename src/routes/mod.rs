pub mod embeddings;
pub mod error;
pub mod health;
pub mod jobs;
pub mod queues;
pub mod search;
pub mod steps;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::AppState;

/// Assemble the full application router.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/pipeline/jobs", post(jobs::create_job))
        .route(
            "/api/pipeline/jobs/{id}",
            get(jobs::get_job).delete(jobs::cancel_job),
        )
        .route("/api/pipeline/steps/{step}", post(steps::handle_step))
        .route("/api/search/segments", post(search::search_segments))
        .route("/api/embeddings/queue", post(embeddings::enqueue))
        .route("/api/embeddings/queue/run", post(embeddings::run_batch))
        .route("/api/embeddings/queue/status", get(embeddings::queue_status))
        .route("/api/admin/queues", get(queues::list_queues))
        .route(
            "/api/admin/queues/{name}",
            get(queues::get_queue).delete(queues::delete_queue),
        )
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, path_regex},
    };

    use super::*;
    use crate::{
        AppState, build_state_for_tests,
        models::QueueItemStatus,
    };

    async fn test_state() -> (AppState, MockServer) {
        let queue_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/queues/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&queue_server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v2/enqueue/.*"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"messageId": "msg_route"})),
            )
            .mount(&queue_server)
            .await;

        let state = build_state_for_tests(&queue_server.uri()).await;
        (state, queue_server)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn test_liveness() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_fetch_job() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipeline/jobs",
                serde_json::json!({
                    "attachment_id": Uuid::new_v4(),
                    "user_id": Uuid::new_v4(),
                    "source_url": "https://cdn.example.com/raw/a.mp4",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let job = body_json(response).await;
        assert_eq!(job["status"], "queued");
        assert_eq!(job["current_step"], "compress");

        let id = job["id"].as_str().unwrap();
        let response = app
            .oneshot(
                Request::get(format!("/api/pipeline/jobs/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        assert_eq!(status["steps"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_create_job_rejects_empty_source_url() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pipeline/jobs",
                serde_json::json!({
                    "attachment_id": Uuid::new_v4(),
                    "user_id": Uuid::new_v4(),
                    "source_url": "",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn test_cancel_twice_conflicts() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipeline/jobs",
                serde_json::json!({
                    "attachment_id": Uuid::new_v4(),
                    "user_id": Uuid::new_v4(),
                    "source_url": "https://cdn.example.com/raw/a.mp4",
                }),
            ))
            .await
            .unwrap();
        let job = body_json(response).await;
        let id = job["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/pipeline/jobs/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "cancelled");

        let response = app
            .oneshot(
                Request::delete(format!("/api/pipeline/jobs/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_step_endpoint_rejects_mismatched_payload() {
        let (state, _guard) = test_state().await;
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/pipeline/jobs",
                serde_json::json!({
                    "attachment_id": Uuid::new_v4(),
                    "user_id": Uuid::new_v4(),
                    "source_url": "https://cdn.example.com/raw/a.mp4",
                }),
            ))
            .await
            .unwrap();
        let job = body_json(response).await;

        // A compress payload posted to the transcribe endpoint.
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/pipeline/steps/transcribe",
                serde_json::json!({
                    "step": "compress",
                    "queue_id": job["id"],
                    "attachment_id": job["attachment_id"],
                    "user_id": job["user_id"],
                    "timestamp": chrono::Utc::now(),
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_embedding_queue_endpoints() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/embeddings/queue",
                serde_json::json!({
                    "content_type": "lesson",
                    "content_id": Uuid::new_v4(),
                    "content_text": "photosynthesis overview",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let item = body_json(response).await;
        assert_eq!(item["status"], serde_json::json!(QueueItemStatus::Queued));
        assert_eq!(item["priority"], 5);

        let response = app
            .oneshot(
                Request::get("/api/embeddings/queue/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let counts = body_json(response).await;
        assert_eq!(counts["queued"], 1);
    }

    #[tokio::test]
    async fn test_search_endpoint_validates_query() {
        let (state, _guard) = test_state().await;
        let app = build_router(state);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/search/segments",
                serde_json::json!({"recall_vector": []}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
