use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mcphost_common::transcript::flatten_text;
use mcphost_common::{ContentSegment, Error, Result, Role, Transcript, Turn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::providers::{LlmProvider, LlmRequest, LlmResponse};
use crate::prune::repair;
use crate::registry::{DispatchError, ToolRegistry};

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Progress callbacks for whoever is driving a turn. Every method defaults to a
/// no-op.
pub trait TurnObserver: Send + Sync {
    fn user_prompt(&self, _prompt: &str) {}
    fn provider_started(&self) {}
    fn provider_finished(&self) {}
    fn backing_off(&self, _attempt: u32, _delay: Duration) {}
    fn assistant_text(&self, _text: &str) {}
    fn tool_started(&self, _tool: &str) {}
    fn tool_finished(&self, _tool: &str) {}
    fn tool_failed(&self, _message: &str) {}
    fn dispatch_skipped(&self, _error: &DispatchError) {}
}

/// Observer that reports nothing.
pub struct SilentObserver;

impl TurnObserver for SilentObserver {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text of the final assistant response that carried any.
    pub reply: String,
    /// Provider calls that produced a response.
    pub rounds: usize,
    /// Tool calls that produced a result, including failures.
    pub tool_calls: usize,
}

/// Runs one user turn to completion: provider call, tool dispatch, repeat until
/// the model stops asking for tools.
pub struct TurnOrchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    model: String,
    system_prompt: Option<String>,
    max_tokens: u32,
    backoff: BackoffPolicy,
    max_rounds: Option<usize>,
    tool_timeout: Option<Duration>,
}

impl TurnOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            backoff: BackoffPolicy::default(),
            max_rounds: None,
            tool_timeout: None,
        }
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt;
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = max_tokens;
    }

    pub fn set_backoff(&mut self, backoff: BackoffPolicy) {
        self.backoff = backoff;
    }

    /// Fail a turn that needs more than `max_rounds` provider calls.
    pub fn set_max_rounds(&mut self, max_rounds: Option<usize>) {
        self.max_rounds = max_rounds;
    }

    pub fn set_tool_timeout(&mut self, timeout: Option<Duration>) {
        self.tool_timeout = timeout;
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Process `prompt` against `transcript`.
    ///
    /// The user turn is appended first. Each round's assistant turn and its tool
    /// turns are appended together once the round finishes, so an error or
    /// cancellation leaves the transcript at the last complete round.
    pub async fn handle_turn(
        &self,
        prompt: &str,
        transcript: &mut Transcript,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        if !prompt.is_empty() {
            observer.user_prompt(prompt);
            transcript.push(Turn::user_text(prompt));
        }

        let mut outcome = TurnOutcome::default();
        loop {
            if let Some(max) = self.max_rounds
                && outcome.rounds >= max
            {
                warn!(rounds = outcome.rounds, "turn stopped at round limit");
                return Err(Error::Agent(format!(
                    "turn exceeded the limit of {max} provider calls"
                )));
            }

            let response = self.complete_with_backoff(transcript, observer, cancel).await?;
            outcome.rounds += 1;

            if let Some(usage) = &response.usage {
                info!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    total_tokens = usage.total(),
                    "usage statistics"
                );
            }

            let assistant = Turn::new(Role::Assistant, response.content);
            let text = assistant.text();
            if !text.is_empty() {
                observer.assistant_text(&text);
                outcome.reply = text;
            }

            let mut results = Vec::new();
            for segment in &assistant.content {
                if let ContentSegment::ToolUse { id, name, input } = segment
                    && let Some(result) = self.dispatch(id, name, input, observer, cancel).await?
                {
                    results.push(result);
                }
            }
            outcome.tool_calls += results.len();

            if !assistant.content.is_empty() {
                transcript.push(assistant);
            }
            let done = results.is_empty();
            for result in results {
                transcript.push(Turn::tool(result));
            }

            if done {
                return Ok(outcome);
            }
        }
    }

    /// Run a turn with no progress reporting and return only the final reply.
    pub async fn handle_turn_for_result(
        &self,
        prompt: &str,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.handle_turn(prompt, transcript, &SilentObserver, cancel)
            .await
            .map(|outcome| outcome.reply)
    }

    /// Owned-value variant: takes the transcript and hands back the updated one
    /// alongside the result.
    pub async fn process_turn(
        &self,
        prompt: &str,
        mut transcript: Transcript,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> (Transcript, Result<TurnOutcome>) {
        let result = self.handle_turn(prompt, &mut transcript, observer, cancel).await;
        (transcript, result)
    }

    async fn complete_with_backoff(
        &self,
        transcript: &Transcript,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse> {
        // skipped invocations stay in the transcript but are never sent
        let request = LlmRequest {
            model: self.model.clone(),
            messages: repair(transcript.turns()),
            system: self.system_prompt.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: None,
            tools: self.registry.definitions().to_vec(),
        };

        let mut attempt = 0u32;
        loop {
            let Some(delay) = self.backoff.delay(attempt) else {
                return Err(Error::RetriesExhausted { attempts: attempt });
            };
            if !delay.is_zero() {
                warn!(
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    "provider overloaded, backing off"
                );
                observer.backing_off(attempt, delay);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            observer.provider_started();
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    observer.provider_finished();
                    return Err(Error::Cancelled);
                }
                result = self.provider.complete(&request) => result,
            };
            observer.provider_finished();

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() => {
                    debug!("transient provider error: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one invocation. `Ok(None)` means it was skipped and yields no result.
    async fn dispatch(
        &self,
        id: &str,
        name: &str,
        input: &serde_json::Value,
        observer: &dyn TurnObserver,
        cancel: &CancellationToken,
    ) -> Result<Option<ContentSegment>> {
        let route = match self.registry.resolve(name) {
            Ok(route) => route,
            Err(e) => {
                warn!(tool = name, "skipping invocation: {e}");
                observer.dispatch_skipped(&e);
                return Ok(None);
            }
        };

        let arguments = match input {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let e = DispatchError::InvalidArguments {
                    tool: name.to_string(),
                    reason: format!("expected a JSON object, got {other}"),
                };
                warn!(tool = name, "skipping invocation: {e}");
                observer.dispatch_skipped(&e);
                return Ok(None);
            }
        };

        let tool = route.name.tool();
        info!(tool = name, "using tool");
        observer.tool_started(tool);
        let call = with_timeout(self.tool_timeout, route.server.call_tool(tool, arguments));
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                observer.tool_finished(tool);
                return Err(Error::Cancelled);
            }
            result = call => result,
        };
        observer.tool_finished(tool);

        match result {
            Ok(output) => {
                let text = flatten_text(&output.content);
                debug!(tool = name, content = %text, "tool result");
                Ok(Some(ContentSegment::ToolResult {
                    tool_use_id: id.to_string(),
                    content: output.content,
                    text,
                    is_error: output.is_error,
                }))
            }
            Err(e) => {
                let message = format!("Error calling tool {tool}: {e}");
                warn!(tool = name, "{message}");
                observer.tool_failed(&message);
                Ok(Some(ContentSegment::error_result(id, message)))
            }
        }
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            Error::Mcp(format!("tool call timed out after {}s", limit.as_secs_f32()))
        })?,
        None => fut.await,
    }
}
