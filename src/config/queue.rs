use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Durable queue provider configuration.
///
/// The provider is an external HTTP message queue with named queues,
/// per-queue parallelism, delayed delivery, and webhook callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Base URL of the queue provider, e.g. `https://qstash.upstash.io`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for the provider API.
    /// Usually supplied via `token = "${QSTASH_TOKEN}"`.
    #[serde(default)]
    pub token: String,

    /// Delivery retries the provider performs per message before giving up
    /// and invoking the failure callback.
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,

    /// Parallelism for each per-owner job lane.
    ///
    /// Kept at 1 so steps of a single owner's jobs never run concurrently,
    /// which is what makes the state machine safe without row locking.
    #[serde(default = "default_lane_parallelism")]
    pub lane_parallelism: u32,

    /// Base delay in seconds between retries of a failed pipeline step.
    /// The actual delay is `retry_count * step_retry_delay_secs`.
    #[serde(default = "default_step_retry_delay")]
    pub step_retry_delay_secs: u64,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "queue.base_url cannot be empty".into(),
            ));
        }
        if self.lane_parallelism == 0 {
            return Err(ConfigError::Validation(
                "queue.lane_parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            provider_retries: default_provider_retries(),
            lane_parallelism: default_lane_parallelism(),
            step_retry_delay_secs: default_step_retry_delay(),
        }
    }
}

fn default_base_url() -> String {
    "https://qstash.upstash.io".into()
}

fn default_provider_retries() -> u32 {
    3
}

fn default_lane_parallelism() -> u32 {
    1
}

fn default_step_retry_delay() -> u64 {
    30
}
