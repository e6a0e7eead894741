//! # plankit
//!
//! Repeatable, resumable provisioning of a single host.
//!
//! A provisioning run is a fixed list of steps (install a package, fetch a
//! file, set an environment variable, run a command). This crate compiles
//! the steps into a dependency-ordered plan, runs it with idempotent
//! re-entry through recorded step status, and verifies the result.
//!
//! ## Core Concepts
//!
//! - **StepDescriptor**: One immutable provisioning action plus its prerequisites
//! - **Plan**: Steps ordered so every prerequisite comes first ([`compile`])
//! - **Engine**: Runs a plan sequentially, fail-fast, skipping succeeded steps
//! - **StateRecorder**: Persists per-step outcomes across runs
//! - **Verifier**: Post-run checks that steps had their declared effect
//!
//! ## Example
//!
//! ```
//! use plankit::{
//!     compile, CancelToken, Engine, HandlerRegistry, MemoryStateRecorder, NoProgress,
//!     StepDescriptor, StepKind,
//! };
//!
//! let plan = compile(vec![
//!     StepDescriptor::new("base", StepKind::InstallPackage).with_param("packages", "curl"),
//!     StepDescriptor::new("prepare", StepKind::RunCommand).requires(["base"]),
//! ])?;
//!
//! let handlers = HandlerRegistry::new()
//!     .with(StepKind::InstallPackage, |_: &StepDescriptor| -> anyhow::Result<()> { Ok(()) })
//!     .with(StepKind::RunCommand, |_: &StepDescriptor| -> anyhow::Result<()> { Ok(()) });
//!
//! let mut state = MemoryStateRecorder::new();
//! let summary = Engine::new(handlers).run(&plan, &mut state, &mut NoProgress, &CancelToken::new())?;
//! assert_eq!(summary.succeeded, 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`ActionHandler`]: Performs one kind of step
//! - [`VerificationHook`]: Checks one kind of step after the run
//! - [`ProgressCallback`]: Receives step transitions
//! - [`StateRecorder`]: Stores step outcomes

pub mod context;
pub mod error;
pub mod executor;
pub mod planner;
pub mod retry;
pub mod state;
pub mod step;
pub mod types;
pub mod verify;

pub use context::{
    ActionHandler, CancelToken, HandlerRegistry, NoProgress, ProgressCallback, VerificationHook,
};
pub use error::{CompileError, RunError, StateError, exit_code};
pub use executor::Engine;
pub use planner::{Plan, compile};
pub use retry::{LogCallback, RetryCallback, RetryConfig, Retryable, with_retry};
pub use state::{
    FileLock, FileStateRecorder, MemoryStateRecorder, StateRecorder, lock_path_for, replace_file,
};
pub use step::{StepDescriptor, StepId, StepKind};
pub use types::{
    CheckOutcome, DryRunAction, ExecutionRecord, RunSummary, StepStatus, StepTransition,
    VerificationReport,
};
pub use verify::Verifier;
