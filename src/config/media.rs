use serde::{Deserialize, Serialize};

use super::ConfigError;

/// External media service configuration.
///
/// Compression, audio extraction, and transcription are performed by
/// external HTTP services; the pipeline only orchestrates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaConfig {
    /// Base URL of the video compression service.
    #[serde(default)]
    pub compressor_url: Option<String>,

    /// Base URL of the audio extraction service.
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Base URL of the transcription service.
    #[serde(default)]
    pub transcriber_url: Option<String>,

    /// Request timeout in seconds for media service calls.
    /// Transcoding and transcription are slow; this is deliberately generous.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl MediaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("media.compressor_url", &self.compressor_url),
            ("media.audio_url", &self.audio_url),
            ("media.transcriber_url", &self.transcriber_url),
        ] {
            if let Some(u) = url
                && u.is_empty()
            {
                return Err(ConfigError::Validation(format!("{name} cannot be empty")));
            }
        }
        Ok(())
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            compressor_url: None,
            audio_url: None,
            transcriber_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    600
}
