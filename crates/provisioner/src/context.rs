//! Provider traits for progress reporting and confirmation
//!
//! These traits allow the engine to be driven from a terminal, a test or
//! an unattended installer without depending on any UI crate.

use crate::registry::Tier;
use crate::types::ExecutionResult;
use anyhow::Result;

/// Progress callback for execution operations
pub trait ProgressCallback: Send {
    /// Called when a tier begins
    fn on_tier_start(&mut self, tier: Tier, count: usize);

    /// Called before a step's first attempt (sequential execution only)
    fn on_step_start(&mut self, id: &str, description: &str);

    /// Called for every finished attempt
    fn on_step_complete(&mut self, result: &ExecutionResult);

    /// Called when a tier finishes, including after a halting failure
    fn on_tier_complete(&mut self, tier: Tier);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_tier_start(&mut self, _tier: Tier, _count: usize) {}
    fn on_step_start(&mut self, _id: &str, _description: &str) {}
    fn on_step_complete(&mut self, _result: &ExecutionResult) {}
    fn on_tier_complete(&mut self, _tier: Tier) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
