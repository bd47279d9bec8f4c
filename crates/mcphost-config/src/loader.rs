use std::path::{Path, PathBuf};

use mcphost_common::{Error, Result};
use tracing::info;

use crate::model::{McpConfig, SERVER_TOOL_SEPARATOR, SystemPromptFile};

/// Loads the tool-server file and the optional system prompt file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// `$HOME/.mcp.json`, falling back to the working directory.
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mcp.json")
    }

    /// Load the tool-server config.
    ///
    /// With no explicit path the default file is used, and created with an empty
    /// server map if it does not exist yet. An explicit path must exist.
    pub fn load_mcp_config(path: Option<&Path>) -> Result<McpConfig> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            let config = McpConfig::default();
            let body = serde_json::to_string_pretty(&config)?;
            std::fs::write(&path, body)?;
            info!("created default config file at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::parse_mcp_config(&path, &contents)?;
        Self::validate(&config)?;
        info!(
            "loaded {} MCP server definition(s) from {}",
            config.mcp_servers.len(),
            path.display()
        );
        Ok(config)
    }

    fn parse_mcp_config(path: &Path, contents: &str) -> Result<McpConfig> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if is_yaml {
            serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("invalid YAML in {}: {e}", path.display())))
        } else {
            serde_json::from_str(contents)
                .map_err(|e| Error::Config(format!("invalid JSON in {}: {e}", path.display())))
        }
    }

    fn validate(config: &McpConfig) -> Result<()> {
        for name in config.mcp_servers.keys() {
            if name.is_empty() {
                return Err(Error::Config("MCP server name must not be empty".into()));
            }
            if name.contains(SERVER_TOOL_SEPARATOR) {
                return Err(Error::Config(format!(
                    "MCP server name '{name}' must not contain '{SERVER_TOOL_SEPARATOR}'"
                )));
            }
        }
        Ok(())
    }

    /// Read the `systemPrompt` field of a JSON file. An empty prompt is `None`.
    pub fn load_system_prompt(path: &Path) -> Result<Option<String>> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "error reading system prompt file {}: {e}",
                path.display()
            ))
        })?;
        let file: SystemPromptFile = serde_json::from_str(&data).map_err(|e| {
            Error::Config(format!(
                "error parsing system prompt file {}: {e}",
                path.display()
            ))
        })?;
        let prompt = file.system_prompt.trim().to_string();
        Ok((!prompt.is_empty()).then_some(prompt))
    }
}
