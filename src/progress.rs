//! Terminal progress for provisioning runs

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use plankit::{ProgressCallback, StepDescriptor, StepTransition};
use std::time::Duration;

use crate::ui;

/// Spinner for quiet phases with no child process output (verification)
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Clear a spinner without leaving a line behind
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}

/// Prints one line per step transition
///
/// Handlers stream their child processes' output straight to the terminal,
/// so steps are announced with plain lines rather than a live bar.
pub struct CliProgress {
    total: usize,
    position: usize,
    quiet: bool,
}

impl CliProgress {
    pub fn new(total: usize, quiet: bool) -> Self {
        Self {
            total,
            position: 0,
            quiet,
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_transition(&mut self, step: &StepDescriptor, transition: &StepTransition) {
        match transition {
            StepTransition::Started => {
                self.position += 1;
                if !self.quiet {
                    ui::step(
                        self.position,
                        self.total,
                        &format!("{} {}", step.id().bold(), format!("({})", step.kind()).dimmed()),
                    );
                }
            }
            StepTransition::Succeeded => {
                if !self.quiet {
                    ui::success(step.id());
                }
            }
            StepTransition::Failed { reason } => {
                ui::error(&format!("{}: {}", step.id(), reason));
            }
            StepTransition::Skipped { reason } => {
                self.position += 1;
                if !self.quiet {
                    println!(
                        "{} {} {}",
                        format!("[{}/{}]", self.position, self.total).dimmed(),
                        step.id(),
                        format!("({reason})").dimmed()
                    );
                }
            }
        }
    }
}
