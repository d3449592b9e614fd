//! Reasoning gateway backed by a siumai chat client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use siumai::prelude::*;
use tracing::{debug, info, instrument, warn};

use metricflow_core::{
    ReasoningError,
    traits::{ReasoningGateway, ReasoningRequest},
};

use super::prompts;
use crate::error::{AgentError, Result};

/// Settings for [`SiumaiReasoningGateway`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmGatewayConfig {
    /// Provider name: `openai`, `anthropic` or `ollama`.
    pub provider: String,
    /// Model name.
    pub model: String,
    /// API key; read from the provider's environment variable when absent.
    pub api_key: Option<String>,
    /// Custom endpoint.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Deadline for one request.
    pub timeout_secs: u64,
}

impl Default for LlmGatewayConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: Some(0.2),
            max_tokens: Some(4096),
            timeout_secs: 120,
        }
    }
}

impl LlmGatewayConfig {
    /// Configuration for a provider and model.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    fn api_key_or_env(&self, variable: &str) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var(variable).ok())
    }
}

/// [`ReasoningGateway`] that asks a chat model for JSON answers.
///
/// Each request kind has its own system prompt describing the expected JSON
/// shape; the structured context is sent as the user message. Replies are
/// stripped of Markdown code fences and parsed, and anything that is not a
/// JSON value is reported as [`ReasoningError::MalformedResponse`].
pub struct SiumaiReasoningGateway {
    client: Arc<dyn ChatCapability>,
    timeout: Duration,
}

impl std::fmt::Debug for SiumaiReasoningGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiumaiReasoningGateway")
            .field("client", &"<ChatCapability>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SiumaiReasoningGateway {
    /// Wrap an existing chat client.
    pub fn new(client: Arc<dyn ChatCapability>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build the chat client described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] for unknown providers or when
    /// the client cannot be built.
    pub async fn from_config(config: &LlmGatewayConfig) -> Result<Self> {
        info!(
            "Creating reasoning gateway for provider {} ({})",
            config.provider, config.model
        );

        let client = match config.provider.to_lowercase().as_str() {
            "openai" => openai_client(config).await?,
            "anthropic" => anthropic_client(config).await?,
            "ollama" => ollama_client(config).await?,
            provider => {
                return Err(AgentError::configuration(format!(
                    "Unsupported LLM provider: {provider}"
                )));
            }
        };

        Ok(Self::new(
            client,
            Duration::from_secs(config.timeout_secs.max(1)),
        ))
    }
}

fn client_error(provider: &str, e: impl std::fmt::Display) -> AgentError {
    AgentError::configuration(format!("Failed to create {provider} client: {e}"))
}

async fn openai_client(config: &LlmGatewayConfig) -> Result<Arc<dyn ChatCapability>> {
    let api_key = config
        .api_key_or_env("OPENAI_API_KEY")
        .ok_or_else(|| AgentError::configuration("OpenAI API key is not set"))?;
    debug!("Creating OpenAI client with model: {}", config.model);

    let mut builder = Siumai::builder()
        .openai()
        .api_key(api_key)
        .model(&config.model);
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    if let Some(base_url) = &config.base_url {
        builder = builder.base_url(base_url);
    }

    let client = builder
        .build()
        .await
        .map_err(|e| client_error("OpenAI", e))?;
    Ok(Arc::new(client))
}

async fn anthropic_client(config: &LlmGatewayConfig) -> Result<Arc<dyn ChatCapability>> {
    let api_key = config
        .api_key_or_env("ANTHROPIC_API_KEY")
        .ok_or_else(|| AgentError::configuration("Anthropic API key is not set"))?;
    debug!("Creating Anthropic client with model: {}", config.model);

    let mut builder = Siumai::builder()
        .anthropic()
        .api_key(api_key)
        .model(&config.model);
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    if let Some(base_url) = &config.base_url {
        builder = builder.base_url(base_url);
    }

    let client = builder
        .build()
        .await
        .map_err(|e| client_error("Anthropic", e))?;
    Ok(Arc::new(client))
}

async fn ollama_client(config: &LlmGatewayConfig) -> Result<Arc<dyn ChatCapability>> {
    debug!("Creating Ollama client with model: {}", config.model);
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or("http://localhost:11434");

    let mut builder = Siumai::builder()
        .ollama()
        .base_url(base_url)
        .model(&config.model);
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    let client = builder
        .build()
        .await
        .map_err(|e| client_error("Ollama", e))?;
    Ok(Arc::new(client))
}

#[async_trait]
impl ReasoningGateway for SiumaiReasoningGateway {
    #[instrument(skip(self, request), fields(kind = %request.kind))]
    async fn request(
        &self,
        request: &ReasoningRequest,
    ) -> std::result::Result<Value, ReasoningError> {
        let context = serde_json::to_string_pretty(&request.context)
            .map_err(|e| ReasoningError::malformed(format!("unserializable context: {e}")))?;
        let messages = vec![
            ChatMessage::system(prompts::system_prompt(request.kind)).build(),
            ChatMessage::user(context).build(),
        ];
        debug!("Sending {} request", request.kind);

        let response = match tokio::time::timeout(self.timeout, self.client.chat(messages)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Reasoning request failed: {}", e);
                return Err(ReasoningError::unavailable(e.to_string()));
            }
            Err(_) => {
                return Err(ReasoningError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        let text = response
            .content_text()
            .ok_or_else(|| ReasoningError::malformed("response has no text content"))?;
        parse_json_payload(text)
    }

    fn name(&self) -> &'static str {
        "siumai"
    }
}

/// Extract the JSON value from a model reply.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded
/// by prose.
pub fn parse_json_payload(text: &str) -> std::result::Result<Value, ReasoningError> {
    let body = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let candidates = [('{', '}'), ('[', ']')];
    for (open, close) in candidates {
        if let (Some(start), Some(end)) = (body.find(open), body.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str::<Value>(&body[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(ReasoningError::malformed(format!(
        "no JSON value in reply: {}",
        body.chars().take(200).collect::<String>()
    )))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_json() {
        let reply = "```json\n{\"rationale\": \"coverage is low\"}\n```";
        assert_eq!(
            parse_json_payload(reply).unwrap(),
            json!({"rationale": "coverage is low"})
        );
    }

    #[test]
    fn test_parse_json_with_prose() {
        let reply = "Here is the outline:\n{\"sections\": []}\nLet me know.";
        assert_eq!(parse_json_payload(reply).unwrap(), json!({"sections": []}));
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_json_payload("I cannot help with that.").unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedResponse { .. }));
    }

    #[test]
    fn test_config_defaults_and_builders() {
        let config = LlmGatewayConfig::new("ollama", "qwen2.5")
            .with_base_url("http://gpu-box:11434")
            .with_timeout(Duration::from_secs(30));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.temperature, Some(0.2));
    }
}
