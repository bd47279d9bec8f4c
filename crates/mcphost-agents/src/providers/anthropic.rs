use super::{LlmProvider, LlmRequest, LlmResponse, Usage, api_error};
use async_trait::async_trait;
use mcphost_common::{ContentSegment, Error, Result, Role, Turn};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    /// Full messages endpoint, e.g. `http://localhost:8080/v1/messages`.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn process_messages(messages: &[Turn]) -> Vec<serde_json::Value> {
        messages
            .iter()
            .map(|turn| {
                let parts: Vec<serde_json::Value> = turn
                    .content
                    .iter()
                    .filter_map(|segment| match segment {
                        ContentSegment::Text { text } if text.is_empty() => None,
                        ContentSegment::Text { text } => Some(json!({
                            "type": "text",
                            "text": text
                        })),
                        ContentSegment::ToolUse { id, name, input } => Some(json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": input
                        })),
                        ContentSegment::ToolResult {
                            tool_use_id,
                            text,
                            is_error,
                            ..
                        } => Some(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_use_id,
                            "content": text,
                            "is_error": is_error
                        })),
                    })
                    .collect();

                json!({
                    "role": match turn.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                        // Anthropic expects tool_result blocks in user turns
                        Role::Tool => "user",
                    },
                    "content": parts
                })
            })
            .collect()
    }

    fn create_request_body(&self, request: &LlmRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": Self::process_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema
                    }))
                    .collect::<Vec<_>>()
            );
        }

        body
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.create_request_body(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(api_error("Anthropic", status, &error_text));
        }

        let raw_response: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("Failed to parse Anthropic response: {e}")))?;

        let mut content = Vec::new();
        for block in raw_response["content"]
            .as_array()
            .ok_or_else(|| Error::Agent("Missing content".to_string()))?
        {
            match block["type"].as_str().unwrap_or_default() {
                "text" => content.push(ContentSegment::text(
                    block["text"].as_str().unwrap_or_default(),
                )),
                "tool_use" => content.push(ContentSegment::ToolUse {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    input: block["input"].clone(),
                }),
                other => debug!("skipping Anthropic content block of type {other}"),
            }
        }

        let usage = raw_response["usage"].as_object().map(|u| Usage {
            input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(LlmResponse {
            content,
            model: raw_response["model"].as_str().unwrap_or_default().to_string(),
            usage,
            stop_reason: raw_response["stop_reason"].as_str().map(str::to_string),
        })
    }
}
