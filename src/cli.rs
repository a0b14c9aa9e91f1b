use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kickstand")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision a host from a kickstart document", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long, global = true, env = "KICKSTAND_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse, validate and order a document without running anything
    Check(DocumentArgs),

    /// Show the ordered execution plan
    Plan(PlanArgs),

    /// Provision the target from a document
    Apply(ApplyArgs),

    /// Print a document in canonical form
    Fmt(FmtArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct DocumentArgs {
    /// Kickstart document
    pub document: PathBuf,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Kickstart document
    pub document: PathBuf,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Kickstart document
    pub document: PathBuf,

    /// Show what would be done without touching the target
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parallel jobs for the base tier
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Where the system being provisioned is mounted
    #[arg(long)]
    pub target_root: Option<PathBuf>,

    /// Attempts per step for transient failures
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds between attempts
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Write the run report here instead of the state directory
    #[arg(long)]
    pub audit_log: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct FmtArgs {
    /// Kickstart document
    pub document: PathBuf,

    /// Rewrite the file in place
    #[arg(short, long)]
    pub write: bool,
}
