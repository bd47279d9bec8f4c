mod commands;
mod display;
mod redaction;
mod session;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mcphost_agents::mcp::McpManager;
use mcphost_agents::providers::create_provider;
use mcphost_agents::{ModelSpec, ProviderSettings, ToolRegistry, TurnOrchestrator};
use mcphost_config::{ConfigLoader, McpConfig, McpServerConfig};
use mcphost_gateway::{AppState, GatewayServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::redaction::RedactingStderr;
use crate::session::InteractiveSession;

const CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "mcphost",
    version,
    about = "Chat with AI models through a unified interface",
    long_about = "mcphost lets an LLM call tools exposed by MCP servers.\n\
                  Models are selected as provider:model, for example \
                  anthropic:claude-3-5-sonnet-latest, openai:gpt-4o or ollama:qwen2.5:3b."
)]
struct Cli {
    /// MCP server config file (default: ~/.mcp.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON file with a `systemPrompt` field
    #[arg(long, value_name = "FILE")]
    system_prompt: Option<PathBuf>,

    /// Number of turns kept in the context window
    #[arg(long, default_value_t = 10)]
    message_window: usize,

    /// Model to use (provider:model)
    #[arg(short, long, default_value = "anthropic:claude-3-5-sonnet-latest")]
    model: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Serve the HTTP chat API instead of the interactive prompt
    #[arg(long)]
    server: bool,

    /// Address for --server mode
    #[arg(long, default_value = "0.0.0.0:6002")]
    listen: SocketAddr,

    /// Base URL for the OpenAI API (e.g. https://api.openai.com/v1)
    #[arg(long)]
    openai_url: Option<String>,

    /// Base URL for the Anthropic API (e.g. https://api.anthropic.com/v1)
    #[arg(long)]
    anthropic_url: Option<String>,

    /// Base URL for the Ollama API
    #[arg(long)]
    ollama_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    /// Maximum tokens per model response
    #[arg(long, default_value_t = 4096)]
    max_tokens: u32,

    /// Fail a turn after this many model calls
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Per tool call timeout in seconds
    #[arg(long, value_name = "SECS")]
    tool_timeout: Option<u64>,

    /// Per server timeout for listing tools, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    list_timeout: u64,

    /// Conversations kept in --server mode before the oldest is dropped
    #[arg(long, default_value_t = 1000)]
    max_conversations: usize,

    /// Drop a --server conversation after this many idle seconds
    #[arg(long, value_name = "SECS", default_value_t = 3600)]
    conversation_idle_timeout: u64,
}

impl Cli {
    fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            anthropic_api_key: self.anthropic_api_key.clone(),
            anthropic_base_url: self.anthropic_url.clone(),
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_url.clone(),
            ollama_base_url: self.ollama_url.clone(),
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingStderr)
        .with_target(debug)
        .with_file(debug)
        .with_line_number(debug)
        .init();
}

/// Connect every configured server. Failures are logged and that server is
/// left out.
async fn connect_servers(manager: &McpManager, config: &McpConfig) -> usize {
    let mut connected = 0;
    for (name, server) in &config.mcp_servers {
        let result = match server {
            McpServerConfig::Stdio { command, args, env } => {
                manager
                    .connect(name, command, args, env, CONNECT_TIMEOUT_SECS)
                    .await
            }
            #[cfg(feature = "mcp-http")]
            McpServerConfig::Http { url } => {
                manager.connect_http(name, url, CONNECT_TIMEOUT_SECS).await
            }
            #[cfg(not(feature = "mcp-http"))]
            McpServerConfig::Http { .. } => Err(mcphost_common::Error::Config(format!(
                "server '{name}' uses the HTTP transport; rebuild with --features mcp-http"
            ))),
        };
        match result {
            Ok(()) => connected += 1,
            Err(e) => warn!(server = %name, "failed to connect: {e}"),
        }
    }
    connected
}

async fn run_server(orchestrator: Arc<TurnOrchestrator>, cli: &Cli) -> anyhow::Result<()> {
    let state = Arc::new(
        AppState::new(orchestrator, cli.message_window).with_limits(
            cli.max_conversations,
            Duration::from_secs(cli.conversation_idle_timeout),
        ),
    );
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    GatewayServer::new(state, cli.listen)
        .run()
        .await
        .context("gateway failed")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let model = ModelSpec::parse(&cli.model)?;
    let provider =
        create_provider(&model, &cli.provider_settings()).context("error creating provider")?;
    info!(provider = %model.provider, model = %model.model, "model loaded");

    let system_prompt = match &cli.system_prompt {
        Some(path) => ConfigLoader::load_system_prompt(path)?,
        None => None,
    };

    let config = ConfigLoader::load_mcp_config(cli.config.as_deref())
        .context("error loading MCP config")?;

    let manager = Arc::new(McpManager::new());
    let connected = connect_servers(&manager, &config).await;
    info!(
        "connected to {connected} of {} MCP server(s)",
        config.mcp_servers.len()
    );

    let registry = ToolRegistry::build(
        manager.tool_servers().await,
        Duration::from_secs(cli.list_timeout),
    )
    .await;
    info!(tools = registry.len(), "tool catalog ready");

    let mut orchestrator = TurnOrchestrator::new(provider, Arc::new(registry), model.model.clone());
    orchestrator.set_system_prompt(system_prompt);
    orchestrator.set_max_tokens(cli.max_tokens);
    orchestrator.set_max_rounds(cli.max_rounds);
    orchestrator.set_tool_timeout(cli.tool_timeout.map(Duration::from_secs));
    let orchestrator = Arc::new(orchestrator);

    let result = if cli.server {
        run_server(orchestrator, &cli).await
    } else {
        InteractiveSession::new(orchestrator, Arc::clone(&manager), config, cli.message_window)
            .run()
            .await
    };

    manager.disconnect_all().await;
    result
}
