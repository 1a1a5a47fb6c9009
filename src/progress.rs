//! Terminal progress and confirmation for plan execution

use colored::Colorize;
use declarative::{ConfirmCallback, ProgressCallback, ProviderError, StatementOutcome};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over compiled statements
pub struct StatementProgress {
    bar: ProgressBar,
    quiet: bool,
}

impl StatementProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet,
        }
    }
}

impl ProgressCallback for StatementProgress {
    fn on_start(&mut self, total: usize) {
        if self.quiet {
            return;
        }
        self.bar = ProgressBar::new(total as u64);
        self.bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
    }

    fn on_statement_start(&mut self, _index: usize, statement: &str) {
        self.bar.set_message(truncate(statement, 50));
    }

    fn on_statement_complete(&mut self, statement: &str, outcome: &StatementOutcome) {
        if let StatementOutcome::Skipped { error } = outcome {
            self.bar.println(format!(
                "  {} {} ({})",
                "⚠".yellow(),
                statement,
                error.message.as_str().dimmed()
            ));
        }
        self.bar.inc(1);
    }

    fn on_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// Asks before running statements, unless `--yes` was given
pub struct Prompt {
    yes: bool,
}

impl Prompt {
    pub fn new(yes: bool) -> Self {
        Self { yes }
    }
}

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool, ProviderError> {
        if self.yes {
            return Ok(true);
        }
        if !console::Term::stdout().features().is_attended() {
            log::warn!("not a terminal; pass --yes to apply without confirmation");
            return Ok(false);
        }
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| ProviderError::other(e.to_string()))
    }
}

/// Shorten a statement for the progress line, keeping the start
fn truncate(statement: &str, max_len: usize) -> String {
    if statement.chars().count() <= max_len {
        statement.to_string()
    } else {
        let head: String = statement.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
