//! Stage progress spinner.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use skyreduce_core::observer::{StageObserver, StageUpdate};
use skyreduce_core::stage::Stage;

use crate::output::format_duration;
use crate::ui;

/// Spinner that follows the driver through its stages and prints a line
/// for every finished stage.
pub struct CLIProgressReporter {
    bar: ProgressBar,
}

impl CLIProgressReporter {
    /// A visible spinner on stderr.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.blue} [{elapsed}] {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// A reporter that draws nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Whether the spinner has been closed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Default for CLIProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StageObserver for CLIProgressReporter {
    fn on_stage(&self, update: &StageUpdate) {
        if let Some(elapsed) = update.elapsed {
            self.bar
                .println(ui::stage_done(update.stage.name(), &format_duration(elapsed)));
            return;
        }
        match update.stage {
            Stage::Done => self.bar.finish_and_clear(),
            Stage::Failed => self.bar.abandon_with_message(format!("failed: {}", update.detail)),
            stage => self.bar.set_message(format!("{stage}: {}", update.detail)),
        }
    }
}

impl Drop for CLIProgressReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_reporter_follows_a_run() {
        let reporter = CLIProgressReporter::hidden();
        reporter.on_stage(&StageUpdate::entered(Stage::Ingesting, "reading 2 partitions"));
        reporter.on_stage(&StageUpdate::finished(
            Stage::Ingesting,
            "reading 2 partitions",
            Duration::from_millis(3),
        ));
        assert!(!reporter.is_finished());
        reporter.on_stage(&StageUpdate::entered(Stage::Done, "run complete"));
        assert!(reporter.is_finished());
    }

    #[test]
    fn failure_abandons_the_spinner() {
        let reporter = CLIProgressReporter::hidden();
        reporter.on_stage(&StageUpdate::entered(Stage::Failed, "ingest failed"));
        assert!(reporter.is_finished());
    }
}
