use std::sync::Mutex;
use std::time::Duration;

use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use mcphost_agents::{DispatchError, TurnObserver};

/// Renders turn progress to the terminal, with a spinner while the provider
/// or a tool is working.
pub struct TerminalObserver {
    spinner: Mutex<Option<ProgressBar>>,
    enabled: bool,
}

impl Default for TerminalObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalObserver {
    pub fn new() -> Self {
        let enabled = Term::stdout().is_term() && std::env::var_os("NO_COLOR").is_none();
        Self {
            spinner: Mutex::new(None),
            enabled,
        }
    }

    fn start_spinner(&self, message: String) {
        if !self.enabled {
            return;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
            .template("{spinner} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut slot) = self.spinner.lock()
            && let Some(previous) = slot.replace(pb)
        {
            previous.finish_and_clear();
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock()
            && let Some(pb) = slot.take()
        {
            pb.finish_and_clear();
        }
    }
}

impl TurnObserver for TerminalObserver {
    fn provider_started(&self) {
        self.start_spinner("Thinking...".to_string());
    }

    fn provider_finished(&self) {
        self.stop_spinner();
    }

    fn backing_off(&self, attempt: u32, delay: Duration) {
        self.stop_spinner();
        println!(
            "{}",
            style(format!(
                "Provider is overloaded, retrying in {:.1}s (retry {attempt})",
                delay.as_secs_f32()
            ))
            .yellow()
        );
    }

    fn assistant_text(&self, text: &str) {
        println!("\n{}", style("Assistant:").magenta().bold());
        println!("{text}\n");
    }

    fn tool_started(&self, tool: &str) {
        self.start_spinner(format!("Running tool {tool}..."));
    }

    fn tool_finished(&self, _tool: &str) {
        self.stop_spinner();
    }

    fn tool_failed(&self, message: &str) {
        println!("{}", style(message).red());
    }

    fn dispatch_skipped(&self, error: &DispatchError) {
        println!("{}", style(format!("Error: {error}")).red());
    }
}

impl Drop for TerminalObserver {
    fn drop(&mut self) {
        self.stop_spinner();
    }
}
