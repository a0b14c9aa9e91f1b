pub mod apply;
pub mod check;
pub mod fmt;
pub mod plan;

use anyhow::{Context as _, Result};
use kickstart::ProvisioningDocument;
use provisioner::{ErrorCategory, ExecutionPlan, Registry, RunOutcome};
use std::path::Path;
use std::process::ExitCode;

/// Process exit status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Unreadable or malformed document, I/O and configuration failures
    Error,
    /// The document parsed but cannot be executed as written
    Invalid,
    /// A directive failed and the run halted
    DirectiveFailed,
    /// The post-install script exited nonzero
    ScriptFailed,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Error => 1,
            Status::Invalid => 2,
            Status::DirectiveFailed => 3,
            Status::ScriptFailed => 4,
        }
    }

    /// Classify an error by the first document or engine error in its chain
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<provisioner::Error>() {
                return match e.category() {
                    ErrorCategory::Validation => Status::Invalid,
                    ErrorCategory::Parse | ErrorCategory::Io => Status::Error,
                };
            }
            if let Some(e) = cause.downcast_ref::<kickstart::Error>() {
                return match e.category() {
                    kickstart::ErrorCategory::Validation => Status::Invalid,
                    kickstart::ErrorCategory::Syntax | kickstart::ErrorCategory::Io => {
                        Status::Error
                    }
                };
            }
        }
        Status::Error
    }

    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Succeeded | RunOutcome::DryRun | RunOutcome::Declined => Status::Success,
            RunOutcome::DirectiveFailed { .. } => Status::DirectiveFailed,
            RunOutcome::ScriptFailed { .. } => Status::ScriptFailed,
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status.code())
    }
}

/// Parse a document and order it against the builtin registry
pub fn load_plan(path: &Path) -> Result<(ProvisioningDocument, ExecutionPlan)> {
    let document = kickstart::parse_file(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let plan = ExecutionPlan::build(&document, &Registry::builtin())
        .with_context(|| format!("{} cannot be executed", path.display()))?;
    log::debug!("Planned {} step(s) from {}", plan.len(), path.display());
    Ok((document, plan))
}
