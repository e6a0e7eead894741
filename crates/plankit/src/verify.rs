//! Verifier - post-run checks that steps achieved their declared effect

use crate::context::VerificationHook;
use crate::planner::Plan;
use crate::step::StepKind;
use crate::types::{CheckOutcome, ExecutionRecord, StepStatus, VerificationReport};
use std::collections::BTreeMap;

/// Runs the verification hook registered for each step's kind
#[derive(Default)]
pub struct Verifier {
    hooks: BTreeMap<StepKind, Box<dyn VerificationHook>>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the hook for a kind, replacing any previous one
    pub fn with_hook(mut self, kind: StepKind, hook: impl VerificationHook + 'static) -> Self {
        self.hooks.insert(kind, Box::new(hook));
        self
    }

    /// Check every step whose kind has a hook that declares a check
    ///
    /// Checks are named `<step id>:<hook name>`. A step that has not
    /// succeeded gets a failing entry without running its hook. Nothing is
    /// rolled back on failure.
    pub fn verify(&self, plan: &Plan, records: &[ExecutionRecord]) -> VerificationReport {
        let statuses: BTreeMap<&str, StepStatus> = records
            .iter()
            .map(|r| (r.id.as_str(), r.status))
            .collect();
        let mut report = VerificationReport::default();

        for step in plan {
            let Some(hook) = self.hooks.get(&step.kind()) else {
                continue;
            };
            let name = format!("{}:{}", step.id(), hook.name());
            let status = statuses.get(step.id()).copied().unwrap_or_default();

            let outcome = if status == StepStatus::Succeeded {
                match hook.check(step) {
                    Some(outcome) => outcome,
                    None => continue,
                }
            } else {
                CheckOutcome::fail(format!("step has not succeeded (status: {status})"))
            };

            if outcome.passed {
                log::debug!("Check {name} passed: {}", outcome.detail);
            } else {
                log::info!("Check {name} failed: {}", outcome.detail);
            }
            report.insert(name, outcome);
        }

        report
    }
}
