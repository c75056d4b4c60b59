use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Embedding backend and embedding queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingsConfig {
    /// Cheap recall-space backend (small model, low dimensionality).
    #[serde(default = "EmbeddingBackendConfig::default_recall")]
    pub recall: EmbeddingBackendConfig,

    /// Precise rerank-space backend (large model, high dimensionality).
    #[serde(default = "EmbeddingBackendConfig::default_rerank")]
    pub rerank: EmbeddingBackendConfig,

    /// Request timeout in seconds for embedding calls.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout in seconds for health probes against embedding backends.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Maximum input length in characters; longer text is truncated
    /// before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Background embedding queue processor settings.
    #[serde(default)]
    pub queue: EmbeddingQueueConfig,
}

impl EmbeddingsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recall.validate("embeddings.recall")?;
        self.rerank.validate("embeddings.rerank")?;
        if self.max_input_chars == 0 {
            return Err(ConfigError::Validation(
                "embeddings.max_input_chars must be positive".into(),
            ));
        }
        self.queue.validate()
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            recall: EmbeddingBackendConfig::default_recall(),
            rerank: EmbeddingBackendConfig::default_rerank(),
            request_timeout_secs: default_request_timeout(),
            health_timeout_secs: default_health_timeout(),
            max_input_chars: default_max_input_chars(),
            queue: EmbeddingQueueConfig::default(),
        }
    }
}

/// A single embedding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingBackendConfig {
    /// Base URL of the backend, exposing `/embed`, `/embed/batch`,
    /// and `/healthz`.
    #[serde(default)]
    pub url: Option<String>,

    /// Dimensionality of the vectors this backend produces.
    /// Responses with any other length are rejected.
    pub dimensions: usize,
}

impl EmbeddingBackendConfig {
    fn default_recall() -> Self {
        Self {
            url: None,
            dimensions: 384,
        }
    }

    fn default_rerank() -> Self {
        Self {
            url: None,
            dimensions: 1024,
        }
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.dimensions == 0 {
            return Err(ConfigError::Validation(format!(
                "{section}.dimensions must be positive"
            )));
        }
        if let Some(u) = &self.url
            && u.is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "{section}.url cannot be empty"
            )));
        }
        Ok(())
    }
}

impl Default for EmbeddingBackendConfig {
    fn default() -> Self {
        Self::default_recall()
    }
}

/// Background embedding queue processor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingQueueConfig {
    /// Whether the background processor runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of queue items claimed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Seconds between batch runs.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// How long a claimed item's lease lasts before the sweeper returns
    /// it to the queue.
    #[serde(default = "default_lease")]
    pub lease_secs: u64,

    /// Retry delay schedule for failed items.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl EmbeddingQueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "embeddings.queue.batch_size must be at least 1".into(),
            ));
        }
        if self.lease_secs == 0 {
            return Err(ConfigError::Validation(
                "embeddings.queue.lease_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_secs as i64)
    }
}

impl Default for EmbeddingQueueConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            batch_size: default_batch_size(),
            interval_secs: default_interval(),
            lease_secs: default_lease(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Retry delay schedule for failed embedding queue items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum BackoffConfig {
    /// Delay grows linearly: `retry_count * base_secs`.
    Linear {
        #[serde(default = "default_backoff_base")]
        base_secs: u64,
    },
    /// Delay doubles each retry: `base_secs * 2^(retry_count - 1)`,
    /// capped at `max_secs`.
    Exponential {
        #[serde(default = "default_backoff_base")]
        base_secs: u64,
        #[serde(default = "default_backoff_max")]
        max_secs: u64,
    },
}

impl BackoffConfig {
    /// Delay before the `retry_count`-th retry (1-based).
    pub fn delay(&self, retry_count: u32) -> chrono::Duration {
        let retry = retry_count.max(1);
        let secs = match self {
            BackoffConfig::Linear { base_secs } => u64::from(retry).saturating_mul(*base_secs),
            BackoffConfig::Exponential { base_secs, max_secs } => base_secs
                .saturating_mul(1u64 << (retry - 1).min(32))
                .min(*max_secs),
        };
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Linear {
            base_secs: default_backoff_base(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> u32 {
    10
}

fn default_interval() -> u64 {
    30
}

fn default_lease() -> u64 {
    120
}

fn default_backoff_base() -> u64 {
    300 // 5 minutes
}

fn default_backoff_max() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

fn default_max_input_chars() -> usize {
    8000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_grows_with_retry_count() {
        let backoff = BackoffConfig::Linear { base_secs: 300 };
        assert_eq!(backoff.delay(1).num_seconds(), 300);
        assert_eq!(backoff.delay(2).num_seconds(), 600);
        assert_eq!(backoff.delay(3).num_seconds(), 900);
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let backoff = BackoffConfig::Exponential {
            base_secs: 60,
            max_secs: 200,
        };
        assert_eq!(backoff.delay(1).num_seconds(), 60);
        assert_eq!(backoff.delay(2).num_seconds(), 120);
        assert_eq!(backoff.delay(3).num_seconds(), 200);
        assert_eq!(backoff.delay(10).num_seconds(), 200);
    }

    #[test]
    fn test_zero_retry_treated_as_first() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay(0), backoff.delay(1));
    }
}
