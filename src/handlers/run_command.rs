//! run-command handler

use anyhow::Result;
use plankit::{ActionHandler, StepDescriptor};

use crate::{paths, runner};

/// Runs a shell command line
///
/// Parameters: `command`, optional `cwd`. The optional `verify` parameter
/// is used by the matching verification hook, not here.
pub struct RunCommandHandler;

impl ActionHandler for RunCommandHandler {
    fn perform(&self, step: &StepDescriptor) -> Result<()> {
        let command = step.require_param("command")?;
        let cwd = step.param("cwd").map(paths::expand);
        log::info!("Running: {command}");
        runner::run_shell(command, cwd.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plankit::StepKind;

    #[test]
    fn test_runs_in_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let step = StepDescriptor::new("prepare", StepKind::RunCommand)
            .with_param("command", "echo ok > out.txt")
            .with_param("cwd", dir.path().to_string_lossy());
        RunCommandHandler.perform(&step).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap().trim(),
            "ok"
        );
    }

    #[test]
    fn test_nonzero_exit_is_failure() {
        let step = StepDescriptor::new("boom", StepKind::RunCommand).with_param("command", "exit 3");
        let err = RunCommandHandler.perform(&step).unwrap_err();
        assert!(err.to_string().contains("status 3"));
    }

    #[cfg(unix)]
    #[test]
    fn test_interrupt_lets_running_step_finish() {
        use plankit::{
            Engine, HandlerRegistry, MemoryStateRecorder, NoProgress, RunError, StateRecorder,
            StepStatus, compile,
        };
        use std::time::Duration;

        let _guard = crate::signal::TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        crate::signal::reset();
        // SAFETY: moves this test process into its own group so the interrupt
        // below reaches only it, the way a terminal Ctrl-C reaches the
        // foreground group
        assert_eq!(unsafe { libc::setpgid(0, 0) }, 0);
        let cancel = crate::signal::install();

        let plan = compile([
            StepDescriptor::new("a", StepKind::RunCommand).with_param("command", "sleep 1; true"),
            StepDescriptor::new("b", StepKind::RunCommand)
                .with_param("command", "true")
                .requires(["a"]),
        ])
        .unwrap();
        let engine =
            Engine::new(HandlerRegistry::new().with(StepKind::RunCommand, RunCommandHandler));
        let mut state = MemoryStateRecorder::new();

        let interrupter = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(300));
            // SAFETY: signals our own process group, which holds only this process
            unsafe { libc::kill(0, libc::SIGINT) };
        });
        let result = engine.run(&plan, &mut state, &mut NoProgress, &cancel);
        interrupter.join().unwrap();
        crate::signal::reset();

        match result {
            Err(RunError::Cancelled { next_step }) => assert_eq!(next_step.as_deref(), Some("b")),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(state.get("a"), StepStatus::Succeeded);
        assert_eq!(state.get("b"), StepStatus::Skipped);
    }
}
