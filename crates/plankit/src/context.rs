//! Action handlers, verification hooks and run callbacks
//!
//! These traits let the engine run without depending on how packages are
//! installed, files are fetched or progress is shown.

use crate::step::{StepDescriptor, StepKind};
use crate::types::{CheckOutcome, StepTransition};
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Performs one kind of provisioning action
///
/// Implementations block until the action is done. Any retry policy (for
/// example backoff on network errors) lives inside the handler; the engine
/// only sees the final outcome.
pub trait ActionHandler: Send + Sync {
    /// Perform the step, returning the failure reason on error
    fn perform(&self, step: &StepDescriptor) -> Result<()>;
}

impl<F> ActionHandler for F
where
    F: Fn(&StepDescriptor) -> Result<()> + Send + Sync,
{
    fn perform(&self, step: &StepDescriptor) -> Result<()> {
        self(step)
    }
}

/// One action handler per step kind
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<StepKind, Box<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a kind, replacing any previous one
    pub fn register(&mut self, kind: StepKind, handler: Box<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, kind: StepKind, handler: impl ActionHandler + 'static) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn get(&self, kind: StepKind) -> Option<&dyn ActionHandler> {
        self.handlers.get(&kind).map(AsRef::as_ref)
    }
}

/// Post-run check that a step's effect is actually present
pub trait VerificationHook: Send + Sync {
    /// Short label used in check names, e.g. "tool-version"
    fn name(&self) -> &'static str;

    /// Run the check, or return `None` when the step declares nothing to check
    fn check(&self, step: &StepDescriptor) -> Option<CheckOutcome>;
}

/// Receives one call per step transition
pub trait ProgressCallback {
    fn on_transition(&mut self, step: &StepDescriptor, transition: &StepTransition);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_transition(&mut self, _step: &StepDescriptor, _transition: &StepTransition) {}
}

/// Shared flag asking the engine to stop before the next step
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. one set from a signal handler)
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { cancelled: flag }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_handler() {
        let registry = HandlerRegistry::new().with(
            StepKind::SetEnv,
            |step: &StepDescriptor| -> Result<()> {
                anyhow::ensure!(step.param("name").is_some(), "no name");
                Ok(())
            },
        );

        let handler = registry.get(StepKind::SetEnv).unwrap();
        assert!(handler.perform(&StepDescriptor::new("x", StepKind::SetEnv)).is_err());
        assert!(registry.get(StepKind::FetchFile).is_none());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
