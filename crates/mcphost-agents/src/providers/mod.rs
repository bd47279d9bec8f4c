use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use mcphost_common::{ContentSegment, Error, Result, Turn};
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Trait for LLM provider integrations (Anthropic, OpenAI, Ollama).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "anthropic", "openai", "ollama").
    fn provider_id(&self) -> &str;

    /// Send the transcript and tool catalog, returning the model's next turn.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentSegment>,
    pub model: String,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: vec![ContentSegment::text(content)],
            model: String::new(),
            usage: None,
            stop_reason: Some("end_turn".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A tool as presented to the model, under its fully-qualified name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A `provider:model` selector such as `anthropic:claude-3-5-sonnet-latest`.
///
/// Only the first `:` separates the two halves, so Ollama tags like
/// `ollama:llama3:8b` keep their tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: String,
    pub model: String,
}

impl ModelSpec {
    pub fn parse(value: &str) -> Result<Self> {
        match value.split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok(Self {
                provider: provider.to_string(),
                model: model.to_string(),
            }),
            _ => Err(Error::Config(format!(
                "invalid model format '{value}', expected provider:model"
            ))),
        }
    }
}

impl FromStr for ModelSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Credentials and endpoint overrides for building a provider.
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub anthropic_api_key: Option<String>,
    /// API root, e.g. `https://api.anthropic.com/v1`.
    pub anthropic_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    /// API root, e.g. `https://api.openai.com/v1`.
    pub openai_base_url: Option<String>,
    pub ollama_base_url: Option<String>,
}

/// Build the provider named by `model`.
pub fn create_provider(
    model: &ModelSpec,
    settings: &ProviderSettings,
) -> Result<Arc<dyn LlmProvider>> {
    match model.provider.as_str() {
        "anthropic" => {
            let api_key = non_empty(&settings.anthropic_api_key).ok_or_else(|| {
                Error::Config(
                    "Anthropic API key not provided. Use --anthropic-api-key flag or \
                     ANTHROPIC_API_KEY environment variable"
                        .to_string(),
                )
            })?;
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(base) = non_empty(&settings.anthropic_base_url) {
                provider =
                    provider.with_base_url(format!("{}/messages", base.trim_end_matches('/')));
            }
            Ok(Arc::new(provider))
        }
        "openai" => {
            let api_key = non_empty(&settings.openai_api_key).ok_or_else(|| {
                Error::Config(
                    "OpenAI API key not provided. Use --openai-api-key flag or \
                     OPENAI_API_KEY environment variable"
                        .to_string(),
                )
            })?;
            Ok(Arc::new(OpenAiProvider::new(
                api_key,
                non_empty(&settings.openai_base_url),
            )))
        }
        "ollama" => Ok(Arc::new(OllamaProvider::new(non_empty(
            &settings.ollama_base_url,
        )))),
        other => Err(Error::Config(format!("unsupported provider: {other}"))),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Map a non-success HTTP reply to an error, flagging overload conditions so the
/// turn loop can back off and retry them.
pub(crate) fn api_error(provider: &str, status: reqwest::StatusCode, body: &str) -> Error {
    let message = format!("{provider} API error: status={}, body={body}", status.as_u16());
    let overloaded = status.as_u16() == 529
        || body.contains("overloaded_error")
        || (status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            && body.to_ascii_lowercase().contains("overloaded"));
    if overloaded {
        Error::Overloaded(message)
    } else {
        Error::Agent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_model_spec_splits_on_first_colon() {
        let parsed = ModelSpec::parse("ollama:llama3:8b").unwrap();
        assert_eq!(parsed.provider, "ollama");
        assert_eq!(parsed.model, "llama3:8b");
        assert_eq!(parsed.to_string(), "ollama:llama3:8b");
    }

    #[test]
    fn test_model_spec_rejects_missing_parts() {
        for bad in ["claude", ":model", "anthropic:", ""] {
            let err = ModelSpec::parse(bad).expect_err("should reject");
            assert!(err.to_string().contains("provider:model"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_create_provider_requires_key() {
        let parsed = ModelSpec::parse("anthropic:claude-3-5-sonnet-latest").unwrap();
        let err = create_provider(&parsed, &ProviderSettings::default())
            .err()
            .expect("missing key must fail");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_create_provider_by_name() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let openai =
            create_provider(&ModelSpec::parse("openai:gpt-4o").unwrap(), &settings).unwrap();
        assert_eq!(openai.provider_id(), "openai");
        let ollama =
            create_provider(&ModelSpec::parse("ollama:qwen2.5").unwrap(), &settings).unwrap();
        assert_eq!(ollama.provider_id(), "ollama");

        let err = create_provider(&ModelSpec::parse("google:gemini").unwrap(), &settings)
            .err()
            .expect("unknown provider");
        assert!(err.to_string().contains("unsupported provider: google"));
    }

    #[test]
    fn test_api_error_classifies_overload() {
        let e = api_error("anthropic", StatusCode::from_u16(529).unwrap(), "");
        assert!(e.is_transient());
        let e = api_error(
            "anthropic",
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"type":"error","error":{"type":"overloaded_error"}}"#,
        );
        assert!(e.is_transient());
        let e = api_error("openai", StatusCode::TOO_MANY_REQUESTS, "rate limit");
        assert!(!e.is_transient());
        assert!(e.to_string().contains("status=429"));
    }
}
