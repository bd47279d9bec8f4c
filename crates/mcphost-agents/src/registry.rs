use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::providers::ToolDefinition;
use crate::tools::{ToolInfo, ToolServer};

/// Joins a server name and a tool name in the catalog.
pub const SEPARATOR: &str = "__";

/// A `<server>__<tool>` name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedToolName {
    server: String,
    tool: String,
}

impl QualifiedToolName {
    pub fn new(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
        }
    }

    /// Anything other than exactly one separator is malformed.
    pub fn parse(name: &str) -> Result<Self, DispatchError> {
        let parts: Vec<&str> = name.split(SEPARATOR).collect();
        match parts.as_slice() {
            [server, tool] => Ok(Self::new(*server, *tool)),
            _ => Err(DispatchError::MalformedName(name.to_string())),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }
}

impl fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.server, self.tool)
    }
}

/// Reasons an invocation is skipped without producing a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid tool name format: {0}")]
    MalformedName(String),
    #[error("Server not found: {0}")]
    UnknownServer(String),
    #[error("Tool not found: {0}")]
    UnknownTool(String),
    #[error("Error parsing tool arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

/// Where an invocation goes.
#[derive(Clone)]
pub struct Route {
    pub name: QualifiedToolName,
    pub server: Arc<dyn ToolServer>,
}

/// One catalog row: the server a tool came from plus its model-facing definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: QualifiedToolName,
    pub definition: ToolDefinition,
}

/// Tool catalog aggregated from every server, plus the routing table used to
/// dispatch invocations back to them. Immutable once built.
///
/// Every advertised name has exactly one route, keyed by its qualified form.
#[derive(Default)]
pub struct ToolRegistry {
    routes: HashMap<String, Route>,
    // listing order of servers that answered
    server_order: Vec<String>,
    catalog: Vec<CatalogEntry>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// List every server's tools concurrently, each bounded by `listing_timeout`.
    /// Servers that fail or time out are logged and left out entirely.
    pub async fn build(
        servers: Vec<(String, Arc<dyn ToolServer>)>,
        listing_timeout: Duration,
    ) -> Self {
        let listings = join_all(servers.into_iter().map(|(name, server)| async move {
            let listed = tokio::time::timeout(listing_timeout, server.list_tools()).await;
            (name, server, listed)
        }))
        .await;

        let mut registry = Self::default();
        for (name, server, listed) in listings {
            match listed {
                Ok(Ok(tools)) => {
                    info!(server = %name, tools = tools.len(), "tools loaded");
                    registry.insert(name, server, tools);
                }
                Ok(Err(e)) => {
                    warn!(server = %name, "error listing tools: {e}");
                }
                Err(_) => {
                    warn!(
                        server = %name,
                        "listing tools timed out after {}s",
                        listing_timeout.as_secs_f32()
                    );
                }
            }
        }
        registry
    }

    fn insert(&mut self, server_name: String, server: Arc<dyn ToolServer>, tools: Vec<ToolInfo>) {
        if server_name.contains(SEPARATOR) {
            warn!(server = %server_name, "server name contains '{SEPARATOR}', skipping its tools");
            return;
        }
        for tool in tools {
            if tool.name.is_empty() || tool.name.contains(SEPARATOR) {
                warn!(
                    server = %server_name,
                    tool = %tool.name,
                    "tool name cannot be qualified, not advertising it"
                );
                continue;
            }
            let name = QualifiedToolName::new(server_name.clone(), tool.name);
            let qualified = name.to_string();
            if self.routes.contains_key(&qualified) {
                warn!(tool = %qualified, "duplicate tool listed, keeping the first");
                continue;
            }
            let definition = ToolDefinition {
                name: qualified.clone(),
                description: tool.description.unwrap_or_default(),
                input_schema: tool.input_schema,
            };
            self.routes.insert(
                qualified,
                Route {
                    name: name.clone(),
                    server: Arc::clone(&server),
                },
            );
            self.definitions.push(definition.clone());
            self.catalog.push(CatalogEntry { name, definition });
        }
        self.server_order.push(server_name);
    }

    /// Definitions to advertise to the model.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Names of servers that contributed to the catalog, in listing order.
    pub fn server_names(&self) -> &[String] {
        &self.server_order
    }

    /// Catalog entries grouped under their server, in listing order.
    pub fn tools_by_server(&self) -> Vec<(&str, Vec<&CatalogEntry>)> {
        self.server_order
            .iter()
            .map(|server| {
                let tools = self
                    .catalog
                    .iter()
                    .filter(|entry| entry.name.server() == server)
                    .collect();
                (server.as_str(), tools)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Route a fully-qualified tool name to the server that owns it.
    ///
    /// Only advertised names resolve. A miss is classified for reporting.
    pub fn resolve(&self, name: &str) -> Result<Route, DispatchError> {
        if let Some(route) = self.routes.get(name) {
            return Ok(route.clone());
        }
        let parsed = QualifiedToolName::parse(name)?;
        if self.server_order.iter().any(|s| s == parsed.server()) {
            Err(DispatchError::UnknownTool(name.to_string()))
        } else {
            Err(DispatchError::UnknownServer(parsed.server().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCallOutput;
    use async_trait::async_trait;
    use mcphost_common::{Error, Result};
    use serde_json::json;

    enum Behaviour {
        Tools(Vec<&'static str>),
        Fail,
        Hang,
    }

    struct FakeServer(Behaviour);

    #[async_trait]
    impl ToolServer for FakeServer {
        async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
            match &self.0 {
                Behaviour::Tools(names) => Ok(names
                    .iter()
                    .map(|n| ToolInfo {
                        name: n.to_string(),
                        description: Some(format!("{n} tool")),
                        input_schema: json!({ "type": "object" }),
                    })
                    .collect()),
                Behaviour::Fail => Err(Error::Mcp("connection refused".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(vec![])
                }
            }
        }

        async fn call_tool(
            &self,
            name: &str,
            _arguments: serde_json::Map<String, serde_json::Value>,
        ) -> Result<ToolCallOutput> {
            Ok(ToolCallOutput::text(name))
        }
    }

    fn server(behaviour: Behaviour) -> Arc<dyn ToolServer> {
        Arc::new(FakeServer(behaviour))
    }

    #[test]
    fn test_parse_qualified_name() {
        let name = QualifiedToolName::parse("fs__read_file").unwrap();
        assert_eq!(name.server(), "fs");
        assert_eq!(name.tool(), "read_file");
        assert_eq!(name.to_string(), "fs__read_file");
    }

    #[test]
    fn test_parse_rejects_wrong_part_count() {
        for bad in ["notaqualifiedname", "a__b__c", "fs_read"] {
            assert_eq!(
                QualifiedToolName::parse(bad),
                Err(DispatchError::MalformedName(bad.to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_build_namespaces_and_skips_bad_servers() {
        let registry = ToolRegistry::build(
            vec![
                ("fs".to_string(), server(Behaviour::Tools(vec!["read", "write"]))),
                ("broken".to_string(), server(Behaviour::Fail)),
                ("slow".to_string(), server(Behaviour::Hang)),
                ("git".to_string(), server(Behaviour::Tools(vec!["read"]))),
            ],
            Duration::from_millis(50),
        )
        .await;

        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fs__read", "fs__write", "git__read"]);
        assert_eq!(registry.server_names(), ["fs".to_string(), "git".to_string()]);
        assert_eq!(registry.definitions()[0].description, "read tool");

        let grouped = registry.tools_by_server();
        assert_eq!(grouped[0].0, "fs");
        assert_eq!(grouped[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_routes_and_reports() {
        let registry = ToolRegistry::build(
            vec![("fs".to_string(), server(Behaviour::Tools(vec!["read"])))],
            Duration::from_secs(1),
        )
        .await;

        let route = registry.resolve("fs__read").unwrap();
        assert_eq!(route.name.tool(), "read");
        let out = route.server.call_tool("read", Default::default()).await.unwrap();
        assert_eq!(out.content[0]["text"], "read");

        assert!(matches!(
            registry.resolve("db__query"),
            Err(DispatchError::UnknownServer(s)) if s == "db"
        ));
        assert!(matches!(
            registry.resolve("read"),
            Err(DispatchError::MalformedName(_))
        ));
    }

    #[tokio::test]
    async fn test_unqualifiable_tool_names_are_not_advertised() {
        let registry = ToolRegistry::build(
            vec![
                ("fs".to_string(), server(Behaviour::Tools(vec!["read__file", "stat", "stat"]))),
                ("bad__name".to_string(), server(Behaviour::Tools(vec!["read"]))),
            ],
            Duration::from_secs(1),
        )
        .await;

        let names: Vec<&str> = registry.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["fs__stat"]);
        assert_eq!(registry.server_names(), ["fs".to_string()]);

        // every advertised name routes
        for definition in registry.definitions() {
            assert!(registry.resolve(&definition.name).is_ok(), "{}", definition.name);
        }
        assert!(matches!(
            registry.resolve("fs__read__file"),
            Err(DispatchError::MalformedName(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool_on_known_server() {
        let registry = ToolRegistry::build(
            vec![("fs".to_string(), server(Behaviour::Tools(vec!["read"])))],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(
            registry.resolve("fs__delete").err(),
            Some(DispatchError::UnknownTool("fs__delete".to_string()))
        );
    }
}
