//! Progress display for installation stages

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use provision::{Outcome, ProgressCallback, ProvisionResult, ResourceKind};

use crate::ui;

/// One bar per stage and a line per finished resource
pub struct StageBar {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl StageBar {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }

    fn print(&self, line: &str) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

fn style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn symbol(outcome: Outcome) -> ColoredString {
    match outcome {
        Outcome::Created => "+".green(),
        Outcome::Updated => "~".yellow(),
        Outcome::Reused => "=".blue(),
        Outcome::Fallback => "⚠".yellow(),
        Outcome::Skipped => "-".dimmed(),
        Outcome::Failed => "✗".red(),
    }
}

/// Display line for a finished resource
pub fn result_line(result: &ProvisionResult) -> String {
    let outcome = serde_json::to_value(result.outcome)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "  {} {} {}",
        symbol(result.outcome),
        result.kind,
        result.logical_id.bold()
    );
    match (&result.provisioned_uid, result.error_message()) {
        (_, Some(message)) => line.push_str(&format!(" {}", message.red())),
        (Some(uid), None) => line.push_str(&format!(" {} {}", outcome.dimmed(), uid.dimmed())),
        (None, None) => line.push_str(&format!(" {}", outcome.dimmed())),
    }
    line
}

impl ProgressCallback for StageBar {
    fn on_stage_start(&mut self, stage: &str, count: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        bar.set_style(style());
        bar.set_prefix(stage.to_string());
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, _kind: ResourceKind, _id: &str, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(ui::truncate_path(description, 48));
        }
    }

    fn on_resource_complete(&mut self, result: &ProvisionResult) {
        self.print(&result_line(result));
        for warning in &result.warnings {
            self.print(&format!("    {} {}", "⚠".yellow(), warning));
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_stage_complete(&mut self, _stage: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
