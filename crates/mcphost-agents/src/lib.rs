pub mod backoff;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod orchestrator;
pub mod providers;
pub mod prune;
pub mod registry;
pub mod tools;

pub use backoff::BackoffPolicy;
pub use orchestrator::{SilentObserver, TurnObserver, TurnOrchestrator, TurnOutcome};
pub use providers::{
    AnthropicProvider, LlmProvider, LlmRequest, LlmResponse, ModelSpec, OllamaProvider,
    OpenAiProvider, ProviderSettings, ToolDefinition, Usage,
};
pub use prune::{prune, repair};
pub use registry::{DispatchError, QualifiedToolName, Route, ToolRegistry};
pub use tools::{ToolCallOutput, ToolInfo, ToolServer};
