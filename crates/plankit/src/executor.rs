//! Execution engine - runs a plan step by step against the host

use crate::context::{CancelToken, HandlerRegistry, ProgressCallback};
use crate::error::RunError;
use crate::planner::Plan;
use crate::state::StateRecorder;
use crate::step::StepDescriptor;
use crate::types::{DryRunAction, RunSummary, StepStatus, StepTransition};
use chrono::Utc;

/// Runs plans sequentially with the registered action handlers
pub struct Engine {
    handlers: HandlerRegistry,
}

impl Engine {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    /// Run every step of the plan in order
    ///
    /// Steps already recorded as succeeded are skipped without calling their
    /// handler. The first failing step is recorded as failed and stops the
    /// run; later steps are left untouched. Cancellation is checked before
    /// each step: the step about to start is recorded as skipped and the run
    /// returns [`RunError::Cancelled`].
    pub fn run(
        &self,
        plan: &Plan,
        state: &mut dyn StateRecorder,
        progress: &mut dyn ProgressCallback,
        cancel: &CancelToken,
    ) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary {
            total: plan.len(),
            ..Default::default()
        };

        for step in plan {
            if cancel.is_cancelled() {
                log::info!("Cancellation requested before step '{}'", step.id());
                state.set(step.id(), StepStatus::Skipped, Utc::now(), Some("cancelled"))?;
                progress.on_transition(
                    step,
                    &StepTransition::Skipped {
                        reason: "cancelled".into(),
                    },
                );
                return Err(RunError::Cancelled {
                    next_step: Some(step.id().to_string()),
                });
            }

            if state.get(step.id()) == StepStatus::Succeeded {
                log::debug!("Step '{}' already succeeded, skipping", step.id());
                progress.on_transition(
                    step,
                    &StepTransition::Skipped {
                        reason: "already succeeded".into(),
                    },
                );
                summary.skipped += 1;
                continue;
            }

            state.set(step.id(), StepStatus::Pending, Utc::now(), None)?;
            progress.on_transition(step, &StepTransition::Started);

            match self.perform(step) {
                Ok(()) => {
                    state.set(step.id(), StepStatus::Succeeded, Utc::now(), None)?;
                    progress.on_transition(step, &StepTransition::Succeeded);
                    summary.succeeded += 1;
                }
                Err(reason) => {
                    log::debug!("Step '{}' failed: {}", step.id(), reason);
                    state.set(step.id(), StepStatus::Failed, Utc::now(), Some(reason.as_str()))?;
                    progress.on_transition(
                        step,
                        &StepTransition::Failed {
                            reason: reason.clone(),
                        },
                    );
                    return Err(RunError::StepFailed {
                        step: step.id().to_string(),
                        reason,
                    });
                }
            }
        }

        Ok(summary)
    }

    /// Report what [`run`](Self::run) would do without touching anything
    pub fn dry_run(&self, plan: &Plan, state: &dyn StateRecorder) -> Vec<(String, DryRunAction)> {
        plan.iter()
            .map(|step| {
                let action = if state.get(step.id()) == StepStatus::Succeeded {
                    DryRunAction::Skip
                } else {
                    DryRunAction::Run
                };
                (step.id().to_string(), action)
            })
            .collect()
    }

    fn perform(&self, step: &StepDescriptor) -> Result<(), String> {
        let handler = self
            .handlers
            .get(step.kind())
            .ok_or_else(|| format!("no handler registered for kind {}", step.kind()))?;

        handler.perform(step).map_err(|e| format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::planner::compile;
    use crate::state::MemoryStateRecorder;
    use crate::step::StepKind;

    fn plan(ids: &[&str]) -> Plan {
        compile(
            ids.iter()
                .map(|id| StepDescriptor::new(*id, StepKind::RunCommand)),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_handler_fails_step() {
        let engine = Engine::new(HandlerRegistry::new());
        let mut state = MemoryStateRecorder::new();

        let err = engine
            .run(&plan(&["a"]), &mut state, &mut NoProgress, &CancelToken::new())
            .unwrap_err();

        match err {
            RunError::StepFailed { step, reason } => {
                assert_eq!(step, "a");
                assert!(reason.contains("run-command"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(state.get("a"), StepStatus::Failed);
    }

    #[test]
    fn test_failure_reason_includes_context_chain() {
        use anyhow::Context;

        let engine = Engine::new(HandlerRegistry::new().with(
            StepKind::RunCommand,
            |_: &StepDescriptor| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("exit status 2")).context("command failed")
            },
        ));
        let mut state = MemoryStateRecorder::new();

        let err = engine
            .run(&plan(&["a"]), &mut state, &mut NoProgress, &CancelToken::new())
            .unwrap_err();

        assert_eq!(err.to_string(), "step 'a' failed: command failed: exit status 2");
        assert_eq!(
            state.record("a").unwrap().error.as_deref(),
            Some("command failed: exit status 2")
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let engine = Engine::new(HandlerRegistry::new());
        let mut state = MemoryStateRecorder::new();
        state
            .set("a", StepStatus::Succeeded, Utc::now(), None)
            .unwrap();

        let actions = engine.dry_run(&plan(&["a", "b"]), &state);
        assert_eq!(
            actions,
            vec![
                ("a".to_string(), DryRunAction::Skip),
                ("b".to_string(), DryRunAction::Run),
            ]
        );
        assert_eq!(state.all_records().len(), 1);
    }

    #[test]
    fn test_failed_step_is_retried_on_next_run() {
        let engine = Engine::new(
            HandlerRegistry::new().with(
                StepKind::RunCommand,
                |_: &StepDescriptor| -> anyhow::Result<()> { Ok(()) },
            ),
        );
        let mut state = MemoryStateRecorder::new();
        state
            .set("a", StepStatus::Failed, Utc::now(), Some("earlier"))
            .unwrap();

        let summary = engine
            .run(&plan(&["a"]), &mut state, &mut NoProgress, &CancelToken::new())
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(state.get("a"), StepStatus::Succeeded);
        assert_eq!(state.record("a").unwrap().error, None);
    }
}
