use std::ops::ControlFlow;
use std::sync::Arc;

use console::style;
use dialoguer::Input;
use mcphost_agents::mcp::McpManager;
use mcphost_agents::{TurnOrchestrator, prune};
use mcphost_common::{Error, Transcript};
use mcphost_config::McpConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::commands::{self, SlashCommand};
use crate::display::TerminalObserver;

/// The interactive prompt loop. Owns the transcript for the whole session.
pub struct InteractiveSession {
    orchestrator: Arc<TurnOrchestrator>,
    manager: Arc<McpManager>,
    config: McpConfig,
    message_window: usize,
    transcript: Transcript,
}

impl InteractiveSession {
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        manager: Arc<McpManager>,
        config: McpConfig,
        message_window: usize,
    ) -> Self {
        Self {
            orchestrator,
            manager,
            config,
            message_window,
            transcript: Transcript::new(),
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        println!(
            "{} {} ({} tools). Type /help for commands.\n",
            style("mcphost").cyan().bold(),
            self.orchestrator.model(),
            self.orchestrator.registry().len()
        );

        loop {
            // Ctrl+C and EOF surface here as a failed read
            let Some(line) = read_prompt().await else {
                println!("\nGoodbye!");
                return Ok(());
            };
            let prompt = line.trim();
            if prompt.is_empty() {
                continue;
            }

            if let Some(command) = SlashCommand::parse(prompt) {
                if self.run_command(command).await.is_break() {
                    println!("Goodbye!");
                    return Ok(());
                }
                continue;
            }

            self.run_turn(prompt).await;
        }
    }

    async fn run_turn(&mut self, prompt: &str) {
        self.transcript = prune(&self.transcript, self.message_window);

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let observer = TerminalObserver::new();
        let result = self
            .orchestrator
            .handle_turn(prompt, &mut self.transcript, &observer, &cancel)
            .await;
        watcher.abort();
        drop(observer);

        match result {
            Ok(outcome) => debug!(
                rounds = outcome.rounds,
                tool_calls = outcome.tool_calls,
                "turn complete"
            ),
            Err(Error::Cancelled) => println!("{}", style("Cancelled.").yellow()),
            Err(e) => println!("{}", style(format!("Error: {e}")).red()),
        }
    }

    async fn run_command(&mut self, command: SlashCommand) -> ControlFlow<()> {
        match command {
            SlashCommand::Help => println!("{}", commands::help_text()),
            SlashCommand::Tools => {
                println!("{}", commands::render_tools(self.orchestrator.registry()))
            }
            SlashCommand::Servers => {
                let live = self.manager.list_servers().await;
                println!("{}", commands::render_servers(&self.config, &live));
            }
            SlashCommand::History => println!("{}", commands::render_history(&self.transcript)),
            SlashCommand::Clear => {
                self.transcript.clear();
                println!("Conversation history cleared.");
            }
            SlashCommand::Quit => return ControlFlow::Break(()),
            SlashCommand::Unknown(name) => {
                println!("Unknown command: {name}");
                println!("{}", commands::help_text());
            }
        }
        println!();
        ControlFlow::Continue(())
    }
}

/// Read one line on a blocking thread. `None` on interrupt, EOF, or a
/// non-interactive terminal.
async fn read_prompt() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt(style("You").green().bold().to_string())
            .allow_empty(true)
            .interact_text()
    })
    .await
    .ok()?
    .ok()
}
