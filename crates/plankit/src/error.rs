//! Error types for planning, running and verifying provisioning plans.
//!
//! Errors are split by the stage that produced them so callers can tell
//! "nothing ran" apart from "ran but the environment is still wrong".

use crate::step::StepId;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes reserved for each failure class.
pub mod exit_code {
    /// Plan ran and verified.
    pub const SUCCESS: i32 = 0;
    /// Usage, config or I/O problem outside the engine.
    pub const GENERAL: i32 = 1;
    /// Plan could not be compiled; nothing ran.
    pub const COMPILE: i32 = 2;
    /// A step failed; the rest of the plan was not run.
    pub const STEP_FAILED: i32 = 3;
    /// Every step ran but a verification hook failed.
    pub const VERIFICATION_FAILED: i32 = 4;
    /// Run was cancelled between steps.
    pub const CANCELLED: i32 = 130;
}

/// The plan declaration is not a valid dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Two steps share an identifier
    #[error("duplicate step identifier '{id}'")]
    DuplicateStep { id: StepId },

    /// A step depends on an identifier that is not declared
    #[error("step '{step}' requires '{missing}', which is not declared")]
    MissingPrerequisite { step: StepId, missing: StepId },

    /// The prerequisites form a cycle
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    Cycle { cycle: Vec<StepId> },
}

fn format_cycle(cycle: &[StepId]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
        None => String::new(),
    }
}

/// Failure reading or writing persisted step records.
#[derive(Debug, Error)]
pub enum StateError {
    /// IO error on the state file or its lock
    #[error("state file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Records could not be serialized
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Everything that can stop a provisioning run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Plan never ran
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A step's action handler reported failure
    #[error("step '{step}' failed: {reason}")]
    StepFailed { step: StepId, reason: String },

    /// Steps ran but the environment does not match what they declared
    #[error("verification failed: {}", .failed.join(", "))]
    VerificationFailed { failed: Vec<String> },

    /// Cancellation was requested between steps
    #[error("cancelled{}", .next_step.as_ref().map(|s| format!(" before step '{s}'")).unwrap_or_default())]
    Cancelled { next_step: Option<StepId> },

    /// The state recorder could not persist a record
    #[error(transparent)]
    State(#[from] StateError),
}

impl RunError {
    /// Exit code reserved for this failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Compile(_) => exit_code::COMPILE,
            Self::StepFailed { .. } => exit_code::STEP_FAILED,
            Self::VerificationFailed { .. } => exit_code::VERIFICATION_FAILED,
            Self::Cancelled { .. } => exit_code::CANCELLED,
            Self::State(_) => exit_code::GENERAL,
        }
    }

    /// The step this error is about, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Compile(CompileError::DuplicateStep { id }) => Some(id),
            Self::Compile(CompileError::MissingPrerequisite { step, .. }) => Some(step),
            Self::Compile(CompileError::Cycle { cycle }) => cycle.first().map(String::as_str),
            Self::StepFailed { step, .. } => Some(step),
            Self::Cancelled { next_step } => next_step.as_deref(),
            Self::VerificationFailed { .. } | Self::State(_) => None,
        }
    }
}
