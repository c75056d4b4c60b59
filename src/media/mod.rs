use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MediaConfig;

/// Errors from external media services.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media service not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Media service error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Media request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result of the compression step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedMedia {
    pub url: String,
    pub size_bytes: i64,
}

/// Result of the audio extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    pub url: String,
}

/// Result of the transcription step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// The three external media operations the pipeline orchestrates.
///
/// Each call is synchronous from the pipeline's point of view: the service
/// does the work and responds with the artifact location. Idempotency is
/// the service's concern; re-invoking with the same source is safe.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn compress(&self, source_url: &str) -> Result<CompressedMedia, MediaError>;

    async fn extract_audio(&self, video_url: &str) -> Result<AudioTrack, MediaError>;

    async fn transcribe(&self, audio_url: &str) -> Result<Transcript, MediaError>;
}

#[derive(Debug, Serialize)]
struct MediaRequest<'a> {
    source_url: &'a str,
}

/// HTTP implementation of [`MediaBackend`] against three service URLs.
pub struct HttpMediaBackend {
    client: reqwest::Client,
    config: MediaConfig,
}

impl HttpMediaBackend {
    pub fn new(client: reqwest::Client, config: MediaConfig) -> Self {
        Self { client, config }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        source_url: &str,
    ) -> Result<T, MediaError> {
        let response = self
            .client
            .post(format!("{}{}", base_url.trim_end_matches('/'), path))
            .json(&MediaRequest { source_url })
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MediaBackend for HttpMediaBackend {
    async fn compress(&self, source_url: &str) -> Result<CompressedMedia, MediaError> {
        let base = self
            .config
            .compressor_url
            .as_deref()
            .ok_or(MediaError::NotConfigured("media.compressor_url"))?;
        self.post(base, "/compress", source_url).await
    }

    async fn extract_audio(&self, video_url: &str) -> Result<AudioTrack, MediaError> {
        let base = self
            .config
            .audio_url
            .as_deref()
            .ok_or(MediaError::NotConfigured("media.audio_url"))?;
        self.post(base, "/extract", video_url).await
    }

    async fn transcribe(&self, audio_url: &str) -> Result<Transcript, MediaError> {
        let base = self
            .config
            .transcriber_url
            .as_deref()
            .ok_or(MediaError::NotConfigured("media.transcriber_url"))?;
        self.post(base, "/transcribe", audio_url).await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    fn backend(server_uri: &str) -> HttpMediaBackend {
        let config = MediaConfig {
            compressor_url: Some(server_uri.to_string()),
            audio_url: Some(server_uri.to_string()),
            transcriber_url: Some(server_uri.to_string()),
            timeout_secs: 5,
        };
        HttpMediaBackend::new(reqwest::Client::new(), config)
    }

    #[tokio::test]
    async fn test_compress_returns_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "https://cdn.example.com/compressed/a.mp4",
                "size_bytes": 42_000_000
            })))
            .mount(&server)
            .await;

        let result = backend(&server.uri())
            .compress("https://cdn.example.com/raw/a.mp4")
            .await
            .unwrap();
        assert_eq!(result.url, "https://cdn.example.com/compressed/a.mp4");
        assert_eq!(result.size_bytes, 42_000_000);
    }

    #[tokio::test]
    async fn test_transcribe_without_duration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"text": "hello class"})),
            )
            .mount(&server)
            .await;

        let transcript = backend(&server.uri())
            .transcribe("https://cdn.example.com/audio/a.mp3")
            .await
            .unwrap();
        assert_eq!(transcript.text, "hello class");
        assert!(transcript.duration_secs.is_none());
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend(&server.uri())
            .extract_audio("https://cdn.example.com/compressed/a.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Upstream { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_service_errors() {
        let backend = HttpMediaBackend::new(reqwest::Client::new(), MediaConfig::default());
        let err = backend.compress("https://cdn.example.com/raw/a.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::NotConfigured(_)));
    }
}
