use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{EmbeddingBackendConfig, EmbeddingsConfig};

/// Errors from embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend not configured: {0}")]
    NotConfigured(&'static str),

    /// The backend answered but the vector failed validation.
    #[error("Invalid embedding from {backend}: {reason}")]
    InvalidVector {
        backend: &'static str,
        reason: String,
    },

    /// Neither backend produced a usable vector for the input.
    #[error("No backend produced a valid embedding")]
    AllBackendsFailed,

    #[error("Embedding backend error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Vectors returned for a single input, one per space.
///
/// Either side may be `None` after a partial backend failure; callers that
/// need at least one space check with [`DualEmbedding::has_any`].
#[derive(Debug, Clone, Default)]
pub struct DualEmbedding {
    pub recall: Option<Vec<f32>>,
    pub rerank: Option<Vec<f32>>,
    /// Token count reported by the backend, when it reports one. The
    /// recall backend's count wins if both answer.
    pub token_count: Option<i64>,
}

impl DualEmbedding {
    pub fn has_any(&self) -> bool {
        self.recall.is_some() || self.rerank.is_some()
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbedBatchRequest<'a> {
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
    #[serde(default)]
    token_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Client for the two embedding backends: a cheap low-dimensional recall
/// model and a precise high-dimensional rerank model.
///
/// A failure in one backend never blocks the other; each `embed_*` call
/// returns whatever subset of spaces succeeded, logging the rest.
#[derive(Clone)]
pub struct DualEmbedder {
    client: reqwest::Client,
    recall: EmbeddingBackendConfig,
    rerank: EmbeddingBackendConfig,
    request_timeout: std::time::Duration,
    health_timeout: std::time::Duration,
    max_input_chars: usize,
}

impl DualEmbedder {
    pub fn new(client: reqwest::Client, config: &EmbeddingsConfig) -> Self {
        Self {
            client,
            recall: config.recall.clone(),
            rerank: config.rerank.clone(),
            request_timeout: std::time::Duration::from_secs(config.request_timeout_secs),
            health_timeout: std::time::Duration::from_secs(config.health_timeout_secs),
            max_input_chars: config.max_input_chars,
        }
    }

    /// Normalize input before embedding: trim, collapse runs of whitespace,
    /// and cap the length.
    pub fn preprocess(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len().min(self.max_input_chars));
        let mut last_was_space = false;
        for c in text.trim().chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            } else {
                out.push(c);
                last_was_space = false;
            }
            if out.chars().count() >= self.max_input_chars {
                break;
            }
        }
        out
    }

    /// Embed one input in both spaces.
    pub async fn embed(&self, text: &str) -> Result<DualEmbedding, EmbeddingError> {
        let input = self.preprocess(text);
        let recall = self
            .embed_one(&self.recall, "recall", &input)
            .await
            .map_err(|e| {
                tracing::warn!(backend = "recall", error = %e, "Embedding backend failed");
                e
            })
            .ok();
        let rerank = self
            .embed_one(&self.rerank, "rerank", &input)
            .await
            .map_err(|e| {
                tracing::warn!(backend = "rerank", error = %e, "Embedding backend failed");
                e
            })
            .ok();

        let token_count = recall
            .as_ref()
            .and_then(|(_, count)| *count)
            .or_else(|| rerank.as_ref().and_then(|(_, count)| *count));
        let result = DualEmbedding {
            recall: recall.map(|(vector, _)| vector),
            rerank: rerank.map(|(vector, _)| vector),
            token_count,
        };
        if !result.has_any() {
            return Err(EmbeddingError::AllBackendsFailed);
        }
        Ok(result)
    }

    /// Embed many inputs in both spaces, preserving order.
    pub async fn embed_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<DualEmbedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let inputs: Vec<String> = texts.iter().map(|t| self.preprocess(t)).collect();

        let recall = match self.embed_many(&self.recall, "recall", &inputs).await {
            Ok(vectors) => Some(vectors),
            Err(e) => {
                tracing::warn!(backend = "recall", error = %e, "Batch embedding failed");
                None
            }
        };
        let rerank = match self.embed_many(&self.rerank, "rerank", &inputs).await {
            Ok(vectors) => Some(vectors),
            Err(e) => {
                tracing::warn!(backend = "rerank", error = %e, "Batch embedding failed");
                None
            }
        };

        if recall.is_none() && rerank.is_none() {
            return Err(EmbeddingError::AllBackendsFailed);
        }

        let mut results = Vec::with_capacity(inputs.len());
        for i in 0..inputs.len() {
            results.push(DualEmbedding {
                recall: recall.as_ref().and_then(|v| v.get(i).cloned()),
                rerank: rerank.as_ref().and_then(|v| v.get(i).cloned()),
                token_count: None,
            });
        }
        Ok(results)
    }

    /// Probe both backends. Returns `(recall_healthy, rerank_healthy)`;
    /// an unconfigured backend reports unhealthy.
    pub async fn health(&self) -> (bool, bool) {
        let recall = self.probe(&self.recall).await;
        let rerank = self.probe(&self.rerank).await;
        (recall, rerank)
    }

    async fn probe(&self, backend: &EmbeddingBackendConfig) -> bool {
        let Some(base) = backend.url.as_deref() else {
            return false;
        };
        let result = self
            .client
            .get(format!("{}/healthz", base.trim_end_matches('/')))
            .timeout(self.health_timeout)
            .send()
            .await;
        matches!(result, Ok(response) if response.status().is_success())
    }

    async fn embed_one(
        &self,
        backend: &EmbeddingBackendConfig,
        name: &'static str,
        input: &str,
    ) -> Result<(Vec<f32>, Option<i64>), EmbeddingError> {
        let base = backend
            .url
            .as_deref()
            .ok_or(EmbeddingError::NotConfigured(name))?;
        let response = self
            .client
            .post(format!("{}/embed", base.trim_end_matches('/')))
            .json(&EmbedRequest { input })
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        validate_vector(&parsed.embedding, backend.dimensions, name)?;
        Ok((parsed.embedding, parsed.token_count))
    }

    async fn embed_many(
        &self,
        backend: &EmbeddingBackendConfig,
        name: &'static str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let base = backend
            .url
            .as_deref()
            .ok_or(EmbeddingError::NotConfigured(name))?;
        let response = self
            .client
            .post(format!("{}/embed/batch", base.trim_end_matches('/')))
            .json(&EmbedBatchRequest { inputs })
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbedBatchResponse = response.json().await?;
        if parsed.embeddings.len() != inputs.len() {
            return Err(EmbeddingError::InvalidVector {
                backend: name,
                reason: format!(
                    "expected {} vectors, got {}",
                    inputs.len(),
                    parsed.embeddings.len()
                ),
            });
        }
        for vector in &parsed.embeddings {
            validate_vector(vector, backend.dimensions, name)?;
        }
        Ok(parsed.embeddings)
    }
}

/// Reject vectors that would poison the index: wrong dimensionality,
/// all zeros, or non-finite components.
pub fn validate_vector(
    vector: &[f32],
    dimensions: usize,
    backend: &'static str,
) -> Result<(), EmbeddingError> {
    if vector.len() != dimensions {
        return Err(EmbeddingError::InvalidVector {
            backend,
            reason: format!("expected {} dimensions, got {}", dimensions, vector.len()),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidVector {
            backend,
            reason: "non-finite component".to_string(),
        });
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::InvalidVector {
            backend,
            reason: "all components are zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::config::EmbeddingsConfig;

    fn embedder(recall_url: Option<String>, rerank_url: Option<String>) -> DualEmbedder {
        let mut config = EmbeddingsConfig::default();
        config.recall.url = recall_url;
        config.recall.dimensions = 3;
        config.rerank.url = rerank_url;
        config.rerank.dimensions = 4;
        DualEmbedder::new(reqwest::Client::new(), &config)
    }

    #[rstest::rstest]
    #[case::wrong_dimensions(vec![0.1, 0.2])]
    #[case::all_zero(vec![0.0, 0.0, 0.0])]
    #[case::nan_component(vec![0.1, f32::NAN, 0.2])]
    #[case::infinite_component(vec![0.1, f32::INFINITY, 0.2])]
    fn test_validate_rejects_bad_vectors(#[case] vector: Vec<f32>) {
        let err = validate_vector(&vector, 3, "recall").unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidVector { .. }));
    }

    #[test]
    fn test_validate_accepts_good_vector() {
        assert!(validate_vector(&[0.1, -0.2, 0.3], 3, "recall").is_ok());
    }

    #[test]
    fn test_preprocess_collapses_whitespace_and_caps_length() {
        let embedder = embedder(None, None);
        assert_eq!(embedder.preprocess("  hello\n\n  world \t"), "hello world");

        let long = "x".repeat(20_000);
        assert_eq!(embedder.preprocess(&long).chars().count(), 8000);
    }

    #[tokio::test]
    async fn test_embed_partial_backend_failure_is_partial_result() {
        let recall_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"embedding": [0.1, 0.2, 0.3]})),
            )
            .mount(&recall_server)
            .await;

        let rerank_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&rerank_server)
            .await;

        let result = embedder(Some(recall_server.uri()), Some(rerank_server.uri()))
            .embed("some text")
            .await
            .unwrap();
        assert!(result.recall.is_some());
        assert!(result.rerank.is_none());
    }

    #[tokio::test]
    async fn test_embed_both_backends_down_is_error() {
        let result = embedder(None, None).embed("some text").await;
        assert!(matches!(result, Err(EmbeddingError::AllBackendsFailed)));
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_order() {
        let recall_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embed/batch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
            })))
            .mount(&recall_server)
            .await;

        let results = embedder(Some(recall_server.uri()), None)
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].recall, Some(vec![0.1, 0.2, 0.3]));
        assert_eq!(results[1].recall, Some(vec![0.4, 0.5, 0.6]));
    }

    #[tokio::test]
    async fn test_health_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/healthz"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (recall, rerank) = embedder(Some(server.uri()), None).health().await;
        assert!(recall);
        assert!(!rerank);
    }
}
