use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL of this service.
    ///
    /// The queue provider delivers step callbacks to this address, so it must
    /// be resolvable from the provider's network. Defaults to the bind
    /// address, which only works for local development.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "default_body_limit")]
    pub max_body_bytes: usize,

    /// Outbound HTTP request timeout in seconds.
    /// Applies to the shared client used for queue and media calls.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl ServerConfig {
    /// The base URL the queue provider should call back to.
    pub fn callback_base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_base_url: None,
            max_body_bytes: default_body_limit(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([127, 0, 0, 1])
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

fn default_http_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_base_url_strips_trailing_slash() {
        let config = ServerConfig {
            public_base_url: Some("https://pipeline.example.com/".into()),
            ..Default::default()
        };
        assert_eq!(config.callback_base_url(), "https://pipeline.example.com");
    }

    #[test]
    fn test_callback_base_url_falls_back_to_bind_address() {
        let config = ServerConfig::default();
        assert_eq!(config.callback_base_url(), "http://127.0.0.1:8080");
    }
}
