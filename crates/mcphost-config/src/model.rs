use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Separator between the server name and the tool name in a fully-qualified tool
/// name (`<server>__<tool>`).
pub const SERVER_TOOL_SEPARATOR: &str = "__";

/// Contents of the tool-server file (`~/.mcp.json` by default).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

/// How to reach one MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    /// Spawn a child process and speak MCP over its stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Streamable HTTP endpoint.
    Http { url: String },
}

impl McpServerConfig {
    pub fn transport_name(&self) -> &'static str {
        match self {
            McpServerConfig::Stdio { .. } => "stdio",
            McpServerConfig::Http { .. } => "http",
        }
    }
}

/// The only field read from a `--system-prompt` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SystemPromptFile {
    #[serde(rename = "systemPrompt", default)]
    pub system_prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stdio_and_http_servers() {
        let raw = r#"{
            "mcpServers": {
                "fs": {
                    "command": "npx",
                    "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
                },
                "search": { "url": "http://localhost:8080/mcp" },
                "sqlite": { "command": "uvx", "env": { "DB": "test.db" } }
            }
        }"#;
        let config: McpConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.mcp_servers.len(), 3);

        match &config.mcp_servers["fs"] {
            McpServerConfig::Stdio { command, args, env } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 3);
                assert!(env.is_empty());
            }
            other => panic!("expected stdio server, got {other:?}"),
        }
        assert_eq!(config.mcp_servers["search"].transport_name(), "http");
        assert_eq!(config.mcp_servers["sqlite"].transport_name(), "stdio");
    }

    #[test]
    fn missing_servers_key_is_empty() {
        let config: McpConfig = serde_json::from_str("{}").unwrap();
        assert!(config.mcp_servers.is_empty());
    }
}
