//! Terminal progress for `apply`
//!
//! A spinner shows the current phase and entry; finished entries are printed
//! above it as they complete.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use provision::{Action, CatalogKey, EntryOutcome, Phase, ProgressCallback};
use std::time::Duration;

use crate::ui;

pub struct ApplyProgress {
    pb: ProgressBar,
    phase: Option<Phase>,
}

impl ApplyProgress {
    /// Hidden when `quiet` or stderr is not a terminal.
    pub fn new(quiet: bool) -> Self {
        let pb = ProgressBar::new_spinner();
        if quiet || !console::Term::stderr().is_term() {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix:.cyan.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb, phase: None }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_phase(&mut self, phase: Phase) {
        if self.phase != Some(phase) {
            log::info!("{}", phase.label());
            self.phase = Some(phase);
        }
        self.pb.set_prefix(phase.label());
        self.pb.set_message(String::new());
    }

    fn on_entry_start(&mut self, key: &CatalogKey, action: Action) {
        self.pb.set_message(format!("{action} {key}"));
    }

    fn on_entry_complete(&mut self, outcome: &EntryOutcome) {
        let line = format!(
            "  {:<12} {} {}",
            ui::entry_status(&outcome.status),
            outcome.key,
            outcome.action.to_string().dimmed()
        );
        self.pb.suspend(|| println!("{line}"));
    }
}

impl Drop for ApplyProgress {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
        }
    }
}
