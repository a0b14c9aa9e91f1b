//! # Provisioner
//!
//! Validation, ordering and execution of kickstart documents.
//!
//! ## Core Concepts
//!
//! - **Registry**: what the engine knows about each directive (capability,
//!   dependency tier, accepted options, required predecessors)
//! - **ExecutionPlan**: the validated document as a total order of steps
//! - **Invoker**: turns one step into a typed request for one subsystem
//! - **Subsystems**: the external tools (disk, packages, network, shell, ...)
//!   behind capability traits
//! - **Executor**: runs the plan tier by tier, retries transient failures
//!   and returns the audit log
//!
//! ## Example
//!
//! ```ignore
//! use provisioner::{ExecuteOptions, ExecutionPlan, Registry, execute_simple};
//!
//! let document = kickstart::parse_file(Path::new("cloud.ks"))?;
//! let plan = ExecutionPlan::build(&document, &Registry::builtin())?;
//!
//! // `subsystems` wires each capability trait to a real tool
//! let report = execute_simple(&plan, &subsystems, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: asks before anything is touched
//! - [`RetryCallback`]: hears about retried attempts
//!
//! Failures found while planning abort before any subsystem is called.
//! Failures during execution halt the run; completed steps are not rolled
//! back.

pub mod capability;
pub mod context;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod planner;
pub mod registry;
pub mod retry;
pub mod script;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use capability::{
    AuthConfig, AuthRequest, BootLocation, BootloaderSpec, BootloaderWriter, CapabilityError,
    CapabilityResult, ClearScope, ClearSpec, DiskTool, FirewallConfig, FirewallSpec,
    NetworkConfig, NetworkMode, NetworkSettings, PackageManager, PartitionSpec, RepoConfig,
    RepoSpec, ScriptInvocation, SelinuxMode, ServiceManager, Setting, ShellExecutor, ShellOutput,
    Subsystems, SystemSettings,
};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use error::{Error, ErrorCategory, InvokeError, Result};
pub use executor::{execute, execute_simple};
pub use invoker::{DEFAULT_DEVICE, Invoker, invoker_for};
pub use planner::{ExecutionPlan, PlannedStep, Step};
pub use registry::{ArgKind, ArgSpec, ArgumentSchema, Capability, HandlerDescriptor, Registry, Tier};
pub use retry::{LogCallback, NoCallback, RetryCallback, RetryPolicy, with_retry};
pub use script::ScriptRunner;
pub use types::{DEFAULT_TARGET_ROOT, ExecuteOptions, ExecutionResult, RunOutcome, RunReport};
