//! Core types for execution results and options

use crate::registry::Capability;
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default mount point of the system being provisioned
pub const DEFAULT_TARGET_ROOT: &str = "/mnt/sysimage";

/// Outcome of one execution attempt of a step
///
/// Retried steps produce one result per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Directive or script id, e.g. `part:/boot#4`
    pub id: String,
    pub capability: Capability,
    /// 1-indexed attempt number
    pub attempt: u32,
    pub success: bool,
    /// Process exit status, only known for the post-install script
    pub exit_code: Option<i32>,
    /// Captured output, or the failure reason
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub(crate) fn new(
        id: impl Into<String>,
        capability: Capability,
        attempt: u32,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            capability,
            attempt,
            success: false,
            exit_code: None,
            output: String::new(),
            started_at,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub(crate) fn succeeded(mut self, output: impl Into<String>) -> Self {
        self.success = true;
        self.output = output.into();
        self
    }

    pub(crate) fn failed(mut self, reason: impl Into<String>) -> Self {
        self.success = false;
        self.output = reason.into();
        self
    }

    pub(crate) fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step and the post-install script succeeded
    Succeeded,
    /// Nothing was executed
    DryRun,
    /// The operator declined the confirmation prompt
    Declined,
    /// A directive failed fatally; later steps did not run
    DirectiveFailed { id: String, reason: String },
    /// The post-install script exited nonzero or could not be started
    ScriptFailed {
        exit_code: Option<i32>,
        reason: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::DirectiveFailed { .. } | Self::ScriptFailed { .. }
        )
    }
}

/// Audit log of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Every attempt in execution order
    pub results: Vec<ExecutionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub(crate) fn new(
        outcome: RunOutcome,
        results: Vec<ExecutionResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            outcome,
            results,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Attempts that failed, including ones later retried successfully
    pub fn failed_attempts(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Distinct steps that ended in success
    pub fn succeeded_steps(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Validate and plan, but touch nothing
    pub dry_run: bool,
    /// Worker threads for the independent tier; 1 keeps it sequential
    pub jobs: usize,
    pub retry: RetryPolicy,
    /// Where the system being provisioned is mounted
    pub target_root: PathBuf,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 1,
            retry: RetryPolicy::default(),
            target_root: PathBuf::from(DEFAULT_TARGET_ROOT),
        }
    }
}
