use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcphost_common::{Error, Result};
use rmcp::ServiceExt;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::server::McpToolServer;
use crate::tools::ToolServer;

/// A live connection to one MCP server.
struct McpConnection {
    service: RunningService<RoleClient, ()>,
    transport: &'static str,
}

/// Manages the lifecycle of MCP server connections.
pub struct McpManager {
    connections: Arc<RwLock<HashMap<String, McpConnection>>>,
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Connect to an MCP server by spawning a child process.
    pub async fn connect(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        timeout_secs: u64,
    ) -> Result<()> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| Error::Mcp(format!("failed to spawn MCP server '{name}': {e}")))?;

        let service = tokio::time::timeout(Duration::from_secs(timeout_secs), ().serve(transport))
            .await
            .map_err(|_| {
                Error::Mcp(format!(
                    "MCP server '{name}' handshake timed out after {timeout_secs}s"
                ))
            })?
            .map_err(|e| Error::Mcp(format!("MCP server '{name}' handshake failed: {e}")))?;

        info!("MCP server '{name}' connected");
        self.connections.write().await.insert(
            name.to_string(),
            McpConnection {
                service,
                transport: "stdio",
            },
        );
        Ok(())
    }

    /// Connect to an MCP server via HTTP (Streamable HTTP transport).
    #[cfg(feature = "mcp-http")]
    pub async fn connect_http(&self, name: &str, url: &str, timeout_secs: u64) -> Result<()> {
        use rmcp::transport::StreamableHttpClientTransport;

        let transport = StreamableHttpClientTransport::from_uri(url);

        let service = tokio::time::timeout(Duration::from_secs(timeout_secs), ().serve(transport))
            .await
            .map_err(|_| {
                Error::Mcp(format!(
                    "MCP server '{name}' HTTP handshake timed out after {timeout_secs}s"
                ))
            })?
            .map_err(|e| Error::Mcp(format!("MCP server '{name}' HTTP handshake failed: {e}")))?;

        info!("MCP server '{name}' connected via HTTP");
        self.connections.write().await.insert(
            name.to_string(),
            McpConnection {
                service,
                transport: "http",
            },
        );
        Ok(())
    }

    /// One [`ToolServer`] per connection, sharing the connection's peer handle.
    pub async fn tool_servers(&self) -> Vec<(String, Arc<dyn ToolServer>)> {
        let conns = self.connections.read().await;
        let mut servers: Vec<(String, Arc<dyn ToolServer>)> = conns
            .iter()
            .map(|(name, conn)| {
                let server: Arc<dyn ToolServer> =
                    Arc::new(McpToolServer::new(name.clone(), conn.service.peer().clone()));
                (name.clone(), server)
            })
            .collect();
        servers.sort_by(|a, b| a.0.cmp(&b.0));
        servers
    }

    /// `(name, transport, connected)` for every server, sorted by name.
    pub async fn list_servers(&self) -> Vec<(String, &'static str, bool)> {
        let conns = self.connections.read().await;
        let mut servers: Vec<_> = conns
            .iter()
            .map(|(name, conn)| (name.clone(), conn.transport, !conn.service.is_closed()))
            .collect();
        servers.sort();
        servers
    }

    /// Disconnect all MCP servers.
    pub async fn disconnect_all(&self) {
        let conns: HashMap<String, McpConnection> =
            std::mem::take(&mut *self.connections.write().await);
        for (name, conn) in conns {
            info!("shutting down MCP server '{name}'");
            if let Err(e) = conn.service.cancel().await {
                warn!("error cancelling MCP server '{name}': {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let manager = McpManager::new();
        let err = manager
            .connect(
                "ghost",
                "/nonexistent/mcp-server-binary",
                &[],
                &HashMap::new(),
                1,
            )
            .await
            .expect_err("spawn must fail");
        assert!(err.to_string().contains("ghost"));
        assert!(manager.list_servers().await.is_empty());
        assert!(manager.tool_servers().await.is_empty());
    }
}
