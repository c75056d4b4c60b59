//! Configuration module for the pipeline service.
//!
//! The service is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! public_base_url = "https://pipeline.example.com"
//!
//! [queue]
//! base_url = "https://qstash.upstash.io"
//! token = "${QSTASH_TOKEN}"
//! ```

mod database;
mod embeddings;
mod media;
mod observability;
mod queue;
mod search;
mod server;

use std::path::Path;

pub use database::*;
pub use embeddings::*;
pub use media::*;
pub use observability::*;
pub use queue::*;
use serde::{Deserialize, Serialize};
pub use search::*;
pub use server::*;

/// Root configuration for the pipeline service.
///
/// Most sections have sensible defaults; only the queue provider and the
/// external media/embedding backends genuinely need configuring.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite database configuration for pipeline state.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Durable queue provider configuration.
    #[serde(default)]
    pub queue: QueueConfig,

    /// External media service configuration (compression, audio, transcription).
    #[serde(default)]
    pub media: MediaConfig,

    /// Embedding backend and embedding queue configuration.
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    /// Two-stage segment search defaults.
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: PipelineConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.queue.validate()?;
        self.media.validate()?;
        self.embeddings.validate()?;
        self.search.validate()?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let whole = cap.get(0).expect("capture group 0 always present");
            let match_start = whole.start();

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && match_start >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..match_start]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
