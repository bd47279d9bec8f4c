use async_trait::async_trait;
use mcphost_common::Result;

/// A tool as advertised by its server, before namespacing.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Raw output of one tool call. `content` items are kept opaque apart from
/// text extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallOutput {
    pub content: Vec<serde_json::Value>,
    pub is_error: bool,
}

impl ToolCallOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![serde_json::json!({ "type": "text", "text": text.into() })],
            is_error: false,
        }
    }
}

/// A remote server hosting tools (an MCP server in production).
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Snapshot of the tools this server offers.
    async fn list_tools(&self) -> Result<Vec<ToolInfo>>;

    /// Invoke `name` (the bare, un-namespaced tool name) with an argument object.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallOutput>;
}
