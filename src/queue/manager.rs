use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::QueueConfig;

/// Errors from the queue provider adapter.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The provider rejected the request for a reason that a retry will not
    /// fix, e.g. a plan limit on queue creation.
    #[error("Queue configuration error: {0}")]
    Configuration(String),

    #[error("Queue not found: {0}")]
    NotFound(String),

    /// Provider-side failure worth retrying.
    #[error("Queue provider error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Queue request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Outcome of `ensure_queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

/// Per-message enqueue options, carried as provider headers.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Number of provider-side delivery retries.
    pub retries: Option<u32>,
    /// Delay before first delivery, in seconds.
    pub delay_secs: Option<u64>,
    /// URL invoked with the destination's response.
    pub callback: Option<String>,
    /// URL invoked when all delivery retries are exhausted.
    pub failure_callback: Option<String>,
}

/// Queue metadata as reported by the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueInfo {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "parallelism")]
    pub parallelism: u32,
    #[serde(rename = "lag", default)]
    pub lag: u64,
}

#[derive(Debug, Serialize)]
struct UpsertQueueRequest<'a> {
    #[serde(rename = "queueName")]
    queue_name: &'a str,
    parallelism: u32,
}

#[derive(Debug, Deserialize)]
struct EnqueueResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

/// HTTP adapter for an Upstash-compatible message queue provider.
///
/// All failures surface as `QueueError`; callers decide which are worth a
/// retry. 412 from queue creation means a plan limit and is terminal.
#[derive(Clone)]
pub struct QueueManager {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl QueueManager {
    pub fn new(client: reqwest::Client, config: &QueueConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Create a queue, or update its parallelism if it already exists.
    pub async fn ensure_queue(&self, name: &str, parallelism: u32) -> QueueResult<EnsureOutcome> {
        let response = self
            .client
            .post(format!("{}/v2/queues/", self.base_url))
            .bearer_auth(&self.token)
            .json(&UpsertQueueRequest {
                queue_name: name,
                parallelism,
            })
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(EnsureOutcome::AlreadyExists),
            201 => Ok(EnsureOutcome::Created),
            412 => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Configuration(format!(
                    "Queue limit reached creating '{}': {}",
                    name, body
                )))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Upstream { status, body })
            }
        }
    }

    /// Enqueue a message for delivery to `destination` through `queue`.
    /// Returns the provider's message id.
    pub async fn enqueue(
        &self,
        queue: &str,
        destination: &str,
        body: &serde_json::Value,
        options: &EnqueueOptions,
    ) -> QueueResult<String> {
        let encoded: String = url::form_urlencoded::byte_serialize(destination.as_bytes()).collect();
        let mut request = self
            .client
            .post(format!("{}/v2/enqueue/{}/{}", self.base_url, queue, encoded))
            .bearer_auth(&self.token)
            .json(body);

        if let Some(retries) = options.retries {
            request = request.header("Upstash-Retries", retries.to_string());
        }
        if let Some(delay) = options.delay_secs {
            request = request.header("Upstash-Delay", format!("{}s", delay));
        }
        if let Some(callback) = &options.callback {
            request = request.header("Upstash-Callback", callback);
        }
        if let Some(failure_callback) = &options.failure_callback {
            request = request.header("Upstash-Failure-Callback", failure_callback);
        }
        request = request.header("Upstash-Method", "POST");

        let response = request.send().await?;
        match response.status().as_u16() {
            200 | 201 => {
                let parsed: EnqueueResponse = response.json().await?;
                Ok(parsed.message_id)
            }
            404 => Err(QueueError::NotFound(queue.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Upstream { status, body })
            }
        }
    }

    /// List all queues known to the provider.
    pub async fn list_queues(&self) -> QueueResult<Vec<QueueInfo>> {
        let response = self
            .client
            .get(format!("{}/v2/queues/", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Upstream { status, body })
            }
        }
    }

    /// Fetch queue metadata.
    pub async fn get_queue(&self, name: &str) -> QueueResult<QueueInfo> {
        let response = self
            .client
            .get(format!("{}/v2/queues/{}", self.base_url, name))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            404 => Err(QueueError::NotFound(name.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Upstream { status, body })
            }
        }
    }

    /// Delete a queue.
    pub async fn remove_queue(&self, name: &str) -> QueueResult<()> {
        let response = self
            .client
            .delete(format!("{}/v2/queues/{}", self.base_url, name))
            .bearer_auth(&self.token)
            .send()
            .await?;

        match response.status().as_u16() {
            200 | 202 | 204 => Ok(()),
            404 => Err(QueueError::NotFound(name.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(QueueError::Upstream { status, body })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json_string, header, method, path},
    };

    use super::*;

    fn manager(base_url: &str) -> QueueManager {
        let config = QueueConfig {
            base_url: base_url.to_string(),
            token: "test-token".to_string(),
            ..QueueConfig::default()
        };
        QueueManager::new(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn test_ensure_queue_created() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/queues/"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json_string(r#"{"queueName":"media-abc","parallelism":1}"#))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let outcome = manager(&server.uri())
            .ensure_queue("media-abc", 1)
            .await
            .unwrap();
        assert_eq!(outcome, EnsureOutcome::Created);
    }

    #[tokio::test]
    async fn test_ensure_queue_plan_limit_is_configuration_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/queues/"))
            .respond_with(ResponseTemplate::new(412).set_body_string("max queues reached"))
            .mount(&server)
            .await;

        let err = manager(&server.uri())
            .ensure_queue("media-abc", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_enqueue_sets_delivery_headers_and_encodes_destination() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v2/enqueue/media-abc/https%3A%2F%2Fapi.example.com%2Fsteps%2Fcompress",
            ))
            .and(header("Upstash-Method", "POST"))
            .and(header("Upstash-Retries", "3"))
            .and(header("Upstash-Delay", "60s"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"messageId": "msg_1"})),
            )
            .mount(&server)
            .await;

        let options = EnqueueOptions {
            retries: Some(3),
            delay_secs: Some(60),
            ..EnqueueOptions::default()
        };
        let message_id = manager(&server.uri())
            .enqueue(
                "media-abc",
                "https://api.example.com/steps/compress",
                &serde_json::json!({"queue_id": "q1"}),
                &options,
            )
            .await
            .unwrap();
        assert_eq!(message_id, "msg_1");
    }

    #[tokio::test]
    async fn test_enqueue_unknown_queue_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = manager(&server.uri())
            .enqueue(
                "missing",
                "https://api.example.com/steps/compress",
                &serde_json::json!({}),
                &EnqueueOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_queue_passthrough() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/queues/media-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "media-abc",
                "parallelism": 1,
                "lag": 4
            })))
            .mount(&server)
            .await;

        let info = manager(&server.uri()).get_queue("media-abc").await.unwrap();
        assert_eq!(info.name, "media-abc");
        assert_eq!(info.parallelism, 1);
        assert_eq!(info.lag, 4);
    }

    #[tokio::test]
    async fn test_remove_queue_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/queues/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = manager(&server.uri()).remove_queue("missing").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/queues/media-abc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let err = manager(&server.uri()).get_queue("media-abc").await.unwrap_err();
        assert!(matches!(err, QueueError::Upstream { status: 500, .. }));
    }
}
