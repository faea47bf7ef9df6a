//! Messages-style HTTP reasoning gateway.

use super::{InvocationOptions, ReasoningGateway};
use crate::errors::{ConfigError, GatewayError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for [`HttpGateway`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGatewayConfig {
    /// Full URL of the messages endpoint.
    pub endpoint: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Response token limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_key_env() -> String {
    "STAGEGATE_API_KEY".to_string()
}

fn default_timeout() -> f64 {
    120.0
}

fn default_max_tokens() -> u32 {
    4096
}

impl HttpGatewayConfig {
    /// Creates a configuration with default key variable, timeout and token limit.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key_env: default_api_key_env(),
            timeout_seconds: default_timeout(),
            max_tokens: default_max_tokens(),
        }
    }

    /// Sets the API key environment variable.
    #[must_use]
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = name.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::invalid(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model must not be blank"));
        }
        if !(self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0) {
            return Err(ConfigError::invalid("timeout_seconds must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    fn into_text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A [`ReasoningGateway`] over a messages-style JSON API.
///
/// The role description becomes the system prompt and the composed task the
/// single user message.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    config: HttpGatewayConfig,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Creates a gateway, reading the API key from the configured variable.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::invalid(format!("failed to build HTTP client: {e}")))?;
        let api_key = std::env::var(&config.api_key_env).ok();
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &HttpGatewayConfig {
        &self.config
    }
}

/// Maps a non-success HTTP status to a gateway failure.
fn classify_status(status: u16, body: &str) -> GatewayError {
    let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    match status {
        429 => GatewayError::rate_limited(message),
        400..=499 => GatewayError::invalid_request(message),
        _ => GatewayError::transient(message),
    }
}

fn classify_transport(err: &reqwest::Error) -> GatewayError {
    if err.is_builder() {
        GatewayError::invalid_request(err.to_string())
    } else {
        GatewayError::transient(err.to_string())
    }
}

#[async_trait]
impl ReasoningGateway for HttpGateway {
    async fn invoke(
        &self,
        role: &str,
        task: &str,
        options: &InvocationOptions,
    ) -> Result<String, GatewayError> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            system: role,
            messages: [Message {
                role: "user",
                content: task,
            }],
            capabilities: (!options.capabilities.is_empty())
                .then_some(options.capabilities.as_slice()),
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        debug!(status = status.as_u16(), "Gateway responded");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::transient(format!("unreadable response: {e}")))?;
        Ok(parsed.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(classify_status(429, ""), GatewayError::RateLimited(_)));
        assert!(matches!(classify_status(400, "bad"), GatewayError::InvalidRequest(_)));
        assert!(matches!(classify_status(401, ""), GatewayError::InvalidRequest(_)));
        assert!(matches!(classify_status(500, ""), GatewayError::Transient(_)));
        assert!(matches!(classify_status(529, ""), GatewayError::Transient(_)));
    }

    #[test]
    fn test_config_validation() {
        assert!(HttpGatewayConfig::new("https://api.example.com/v1/messages", "m1")
            .validate()
            .is_ok());
        assert!(HttpGatewayConfig::new("ftp://x", "m1").validate().is_err());
        assert!(HttpGatewayConfig::new("https://x", " ").validate().is_err());
        assert!(HttpGatewayConfig::new("https://x", "m1")
            .with_timeout(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let capabilities = vec!["web_search".to_string()];
        let body = MessagesRequest {
            model: "m1",
            max_tokens: 10,
            system: "You are a copywriter.",
            messages: [Message {
                role: "user",
                content: "Write a tagline.",
            }],
            capabilities: Some(capabilities.as_slice()),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["system"], "You are a copywriter.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["capabilities"][0], "web_search");
    }

    #[test]
    fn test_response_text_joined() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"Part one"},{"type":"tool_use"},{"type":"text","text":"Part two"}]}"#,
        )
        .unwrap();
        assert_eq!(response.into_text(), "Part one\nPart two");
    }
}
