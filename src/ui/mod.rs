//! Terminal output for the CLI: a task spinner and coloured status labels.
//!
//! Everything here draws to stderr so that converted text on stdout can be
//! piped cleanly.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::time::Duration;

use crate::models::{TaskStatus, TaskView};

/// Check if stderr is a terminal.
pub fn is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// Status name, coloured when stderr is a terminal.
pub fn status_label(status: TaskStatus) -> String {
    let label = status.as_str();
    if !is_terminal() {
        return label.to_string();
    }
    match status {
        TaskStatus::Pending => label.yellow().to_string(),
        TaskStatus::Running => label.cyan().to_string(),
        TaskStatus::Succeeded => label.green().bold().to_string(),
        TaskStatus::Failed => label.red().bold().to_string(),
    }
}

/// One-line summary of a task for humans
pub fn summary_line(view: &TaskView) -> String {
    let mut line = format!(
        "{} [{}] {}",
        view.paper_id,
        status_label(view.status),
        view.task_id
    );
    if let Some(error) = &view.error {
        line.push_str(&format!(": {}", error));
    }
    if let Some(result) = &view.result {
        line.push_str(&format!(" ({} chars)", result.len()));
    }
    line
}

/// Spinner shown while polling a task
pub struct TaskSpinner {
    pb: ProgressBar,
}

impl TaskSpinner {
    /// Create a spinner; hidden when `quiet` or when stderr is not a terminal
    pub fn new(msg: &str, quiet: bool) -> Self {
        let pb = if quiet || !is_terminal() {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ "),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    /// Update the message with the latest polled status
    pub fn update(&self, view: &TaskView) {
        self.pb
            .set_message(format!("{} {}", view.paper_id, status_label(view.status)));
    }

    pub fn finish_with_success(&self, msg: &str) {
        self.pb.finish_and_clear();
        if !self.pb.is_hidden() {
            eprintln!("{} {}", "✓".green(), msg);
        }
    }

    pub fn finish_with_error(&self, msg: &str) {
        self.pb.finish_and_clear();
        if !self.pb.is_hidden() {
            eprintln!("{} {}", "✗".red(), msg);
        }
    }
}
