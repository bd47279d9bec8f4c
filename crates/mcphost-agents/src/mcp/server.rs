use async_trait::async_trait;
use mcphost_common::{Error, Result};
use rmcp::model::CallToolRequestParams;
use rmcp::service::{Peer, RoleClient};

use crate::tools::{ToolCallOutput, ToolInfo, ToolServer};

/// One MCP server seen through the [`ToolServer`] seam.
#[derive(Clone)]
pub struct McpToolServer {
    server_name: String,
    peer: Peer<RoleClient>,
}

impl McpToolServer {
    pub fn new(server_name: impl Into<String>, peer: Peer<RoleClient>) -> Self {
        Self {
            server_name: server_name.into(),
            peer,
        }
    }
}

#[async_trait]
impl ToolServer for McpToolServer {
    async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let tools = self.peer.list_all_tools().await.map_err(|e| {
            Error::Mcp(format!(
                "failed to list tools from '{}': {e}",
                self.server_name
            ))
        })?;

        Ok(tools
            .into_iter()
            .map(|t| ToolInfo {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: serde_json::to_value(&*t.input_schema).unwrap_or_default(),
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallOutput> {
        let params: CallToolRequestParams = serde_json::from_value(serde_json::json!({
            "name": name,
            "arguments": arguments,
        }))?;

        let result = self.peer.call_tool(params).await.map_err(|e| {
            Error::Mcp(format!(
                "tool '{name}' on MCP server '{}' failed: {e}",
                self.server_name
            ))
        })?;

        let content = result
            .content
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ToolCallOutput {
            content,
            is_error: result.is_error.unwrap_or(false),
        })
    }
}
