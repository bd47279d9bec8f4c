use std::fmt::Write;

use mcphost_agents::ToolRegistry;
use mcphost_common::{ContentSegment, Role, Transcript};
use mcphost_config::McpConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Tools,
    Servers,
    History,
    Clear,
    Quit,
    Unknown(String),
}

impl SlashCommand {
    /// `None` unless the input starts with `/`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }
        let name = input.split_whitespace().next().unwrap_or(input);
        Some(match name.to_ascii_lowercase().as_str() {
            "/help" => Self::Help,
            "/tools" => Self::Tools,
            "/servers" => Self::Servers,
            "/history" => Self::History,
            "/clear" => Self::Clear,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Unknown(name.to_string()),
        })
    }
}

pub fn help_text() -> String {
    [
        "Available commands:",
        "  /help     show this help",
        "  /tools    list available tools",
        "  /servers  list configured MCP servers",
        "  /history  show conversation history",
        "  /clear    clear conversation history",
        "  /quit     exit the application",
        "",
        "Press Ctrl+C during a response to cancel it.",
    ]
    .join("\n")
}

pub fn render_tools(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return "No tools available.".to_string();
    }
    let mut out = String::new();
    for (server, tools) in registry.tools_by_server() {
        let _ = writeln!(out, "{server}");
        for entry in tools {
            let description = entry.definition.description.lines().next().unwrap_or("");
            if description.is_empty() {
                let _ = writeln!(out, "  - {}", entry.name.tool());
            } else {
                let _ = writeln!(out, "  - {}: {description}", entry.name.tool());
            }
        }
    }
    out.trim_end().to_string()
}

/// `live` is `(name, transport, connected)` as reported by the MCP manager.
pub fn render_servers(config: &McpConfig, live: &[(String, &str, bool)]) -> String {
    if config.mcp_servers.is_empty() {
        return "No MCP servers configured.".to_string();
    }
    let mut out = String::new();
    for (name, server) in &config.mcp_servers {
        let state = match live.iter().find(|(n, _, _)| n == name) {
            Some((_, _, true)) => "connected",
            Some((_, _, false)) => "closed",
            None => "not connected",
        };
        let _ = writeln!(out, "{name} ({}): {state}", server.transport_name());
    }
    out.trim_end().to_string()
}

pub fn render_history(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return "No conversation history.".to_string();
    }
    let mut out = String::new();
    for turn in transcript {
        let label = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        let _ = writeln!(out, "{label}:");
        for segment in &turn.content {
            match segment {
                ContentSegment::Text { text } => {
                    let _ = writeln!(out, "  {text}");
                }
                ContentSegment::ToolUse { name, input, .. } => {
                    let _ = writeln!(out, "  [tool call] {name} {input}");
                }
                ContentSegment::ToolResult { text, is_error, .. } => {
                    let tag = if *is_error { "tool error" } else { "tool result" };
                    let _ = writeln!(out, "  [{tag}] {text}");
                }
            }
        }
    }
    out.trim_end().to_string()
}
