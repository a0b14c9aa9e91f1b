//! Terminal progress and confirmation for `kickstand apply`

use crate::ui;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use provisioner::{ConfirmCallback, ExecutionResult, ProgressCallback, Tier};
use std::time::Duration;

/// One spinner per tier, with a status line per finished attempt
pub struct TerminalProgress {
    quiet: bool,
    spinner: Option<ProgressBar>,
}

impl TerminalProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            spinner: None,
        }
    }

    fn print(&self, line: &str) {
        match &self.spinner {
            Some(pb) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_tier_start(&mut self, tier: Tier, count: usize) {
        if self.quiet {
            return;
        }
        ui::section(&format!("{tier} ({})", ui::count(count, "step")));
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("running {tier} tier"));
        self.spinner = Some(pb);
    }

    fn on_step_start(&mut self, _id: &str, description: &str) {
        if let Some(pb) = &self.spinner {
            pb.set_message(description.to_string());
        }
    }

    fn on_step_complete(&mut self, result: &ExecutionResult) {
        if self.quiet {
            return;
        }
        let took = ui::format_duration(result.duration_ms).dimmed();
        let line = if result.success {
            format!("  {} {} {}", "✓".green(), result.id, took)
        } else {
            let reason = result.output.lines().last().unwrap_or_default();
            format!(
                "  {} {} {} {}",
                "✗".red(),
                result.id,
                format!("(attempt {})", result.attempt).yellow(),
                reason.dimmed()
            )
        };
        self.print(&line);
    }

    fn on_tier_complete(&mut self, _tier: Tier) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

/// Ask on the terminal before anything is touched
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}
