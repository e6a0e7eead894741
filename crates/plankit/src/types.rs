//! Core types shared by the engine, the state recorder and the verifier

use crate::step::StepId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Recorded outcome of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not run yet, or started and never finished
    #[default]
    Pending,
    /// Handler reported success
    Succeeded,
    /// Handler reported failure
    Failed,
    /// Not run because the run was cancelled before it
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: StepId,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A step changing state during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTransition {
    Started,
    Succeeded,
    Failed { reason: String },
    Skipped { reason: String },
}

/// What a dry run says would happen to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunAction {
    /// Would call the step's handler
    Run,
    /// Already succeeded, would be skipped
    Skip,
}

/// Counts for a run that reached the end of the plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Steps whose handler ran and succeeded
    pub succeeded: usize,
    /// Steps skipped because an earlier run already succeeded them
    pub skipped: usize,
    /// Steps in the plan
    pub total: usize,
}

impl RunSummary {
    /// Whether the run performed any action at all
    pub fn did_work(&self) -> bool {
        self.succeeded > 0
    }
}

/// Result of one verification check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

/// All verification checks of one run, keyed by check name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    checks: BTreeMap<String, CheckOutcome>,
}

impl VerificationReport {
    pub(crate) fn insert(&mut self, name: String, outcome: CheckOutcome) {
        self.checks.insert(name, outcome);
    }

    pub fn checks(&self) -> &BTreeMap<String, CheckOutcome> {
        &self.checks
    }

    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.get(name)
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// True when no check failed (an empty report passes)
    pub fn passed(&self) -> bool {
        self.checks.values().all(|c| c.passed)
    }

    /// Names of failed checks
    pub fn failures(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Turn a failing report into [`RunError::VerificationFailed`](crate::RunError::VerificationFailed)
    pub fn into_result(self) -> Result<Self, crate::error::RunError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(crate::error::RunError::VerificationFailed {
                failed: self.failures(),
            })
        }
    }
}
