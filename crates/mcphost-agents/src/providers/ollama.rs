use super::{LlmProvider, LlmRequest, LlmResponse, Usage, api_error};
use async_trait::async_trait;
use mcphost_common::{ContentSegment, Error, Result, Role};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
}

impl OllamaProvider {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: Client::new(),
        }
    }

    fn build_request_body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        for turn in &request.messages {
            match turn.role {
                Role::Tool => {
                    for segment in &turn.content {
                        if let ContentSegment::ToolResult { text, .. } = segment {
                            messages.push(json!({ "role": "tool", "content": text }));
                        }
                    }
                }
                role => {
                    let mut msg = json!({
                        "role": role.as_str(),
                        "content": turn.text(),
                    });
                    let calls: Vec<Value> = turn
                        .content
                        .iter()
                        .filter_map(|segment| match segment {
                            ContentSegment::ToolUse { name, input, .. } => Some(json!({
                                "function": { "name": name, "arguments": input }
                            })),
                            _ => None,
                        })
                        .collect();
                    if !calls.is_empty() {
                        msg["tool_calls"] = json!(calls);
                    }
                    messages.push(msg);
                }
            }
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "stream": false,
        });

        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema
                        }
                    }))
                    .collect::<Vec<_>>()
            );
        }

        let mut options = serde_json::Map::new();
        if let Some(temp) = request.temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        body
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    model: String,
    message: Option<OllamaMessage>,
    done: bool,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    id: Option<String>,
    function: OllamaFunctionCall,
}

#[derive(Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn provider_id(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request);
        let url = format!("{}/api/chat", self.base_url);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Ollama request failed: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let error_text = res.text().await.unwrap_or_default();
            return Err(api_error("Ollama", status, &error_text));
        }

        let ollama_res: OllamaResponse = res
            .json()
            .await
            .map_err(|e| Error::Agent(format!("Failed to parse Ollama response: {e}")))?;

        let mut content = Vec::new();
        if let Some(msg) = ollama_res.message {
            if !msg.content.is_empty() {
                content.push(ContentSegment::text(msg.content));
            }
            for call in msg.tool_calls {
                // Ollama omits call ids
                let id = call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                content.push(ContentSegment::ToolUse {
                    id,
                    name: call.function.name,
                    input: call.function.arguments,
                });
            }
        }

        Ok(LlmResponse {
            content,
            model: ollama_res.model,
            usage: Some(Usage {
                input_tokens: ollama_res.prompt_eval_count,
                output_tokens: ollama_res.eval_count,
            }),
            stop_reason: if ollama_res.done {
                Some("stop".to_string())
            } else {
                None
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolDefinition;
    use mcphost_common::Turn;

    fn request(messages: Vec<Turn>) -> LlmRequest {
        LlmRequest {
            model: "llama3".to_string(),
            messages,
            system: None,
            max_tokens: None,
            temperature: None,
            tools: vec![],
        }
    }

    #[test]
    fn test_request_serialization() {
        let provider = OllamaProvider::new(None);
        let mut req = request(vec![Turn::user_text("Hello")]);
        req.max_tokens = Some(100);
        req.temperature = Some(0.7);
        req.system = Some("be brief".to_string());
        req.tools = vec![ToolDefinition {
            name: "fs__read".to_string(),
            description: "Read a file".to_string(),
            input_schema: json!({ "type": "object" }),
        }];

        let body = provider.build_request_body(&req);

        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hello");
        assert_eq!(body["tools"][0]["function"]["name"], "fs__read");
        assert_eq!(body["options"]["temperature"], 0.7);
        assert_eq!(body["options"]["num_predict"], 100);
    }

    // Integration tests with axum
    use axum::{Json, Router, routing::post};
    use tokio::sync::oneshot;

    async fn run_mock_server(reply: Value) -> (String, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel::<()>();

        let app = Router::new().route(
            "/api/chat",
            post(move |Json(_payload): Json<Value>| {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    rx.await.ok();
                })
                .await
                .unwrap();
        });

        (url, tx)
    }

    #[tokio::test]
    async fn test_complete() {
        let (url, stop) = run_mock_server(json!({
            "model": "llama3",
            "message": { "role": "assistant", "content": "Hello World" },
            "done": true,
            "prompt_eval_count": 10,
            "eval_count": 5
        }))
        .await;
        let provider = OllamaProvider::new(Some(url));

        let res = provider.complete(&request(vec![Turn::user_text("Hi")])).await.unwrap();

        match &res.content[0] {
            ContentSegment::Text { text } => assert_eq!(text, "Hello World"),
            _ => panic!("Expected text content"),
        }
        assert_eq!(res.usage.unwrap().total(), 15);

        let _ = stop.send(());
    }

    #[tokio::test]
    async fn test_tool_calls_get_generated_ids() {
        let (url, stop) = run_mock_server(json!({
            "model": "llama3",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "fs__read", "arguments": { "path": "/a" } } },
                    { "function": { "name": "fs__read", "arguments": { "path": "/b" } } }
                ]
            },
            "done": true
        }))
        .await;
        let provider = OllamaProvider::new(Some(url));

        let res = provider.complete(&request(vec![Turn::user_text("read")])).await.unwrap();
        let ids: Vec<&str> = res.content.iter().filter_map(ContentSegment::invocation_id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids[0].starts_with("call_"));

        let _ = stop.send(());
    }
}
