use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::{Status, load_plan, plan::print_plan};
use crate::config::Config;
use crate::progress::{PromptConfirm, TerminalProgress};
use crate::system;
use crate::ui;
use anyhow::{Context as _, Result};
use provisioner::{AutoConfirm, ExecuteOptions, RetryPolicy, RunOutcome, RunReport, execute};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn run(ctx: &Context, config: &Config, args: ApplyArgs) -> Result<Status> {
    let (_, plan) = load_plan(&args.document)?;
    let opts = options(config, &args);

    if !ctx.quiet {
        ui::header("kickstand apply");
        ui::kv("Document", &args.document.display().to_string());
        ui::kv("Target", &opts.target_root.display().to_string());
        ui::kv("Steps", &plan.len().to_string());
        if opts.jobs > 1 {
            ui::kv("Jobs", &opts.jobs.to_string());
        }
    }

    if opts.dry_run {
        print_plan(&plan);
        println!();
        ui::info("Dry run - nothing was changed");
    }

    let subsystems = system::subsystems(config, &opts.target_root);
    let mut progress = TerminalProgress::new(ctx.quiet);
    let report = if args.yes {
        execute(&plan, &subsystems, &opts, &mut progress, &mut AutoConfirm)?
    } else {
        execute(&plan, &subsystems, &opts, &mut progress, &mut PromptConfirm)?
    };

    if !matches!(report.outcome, RunOutcome::DryRun | RunOutcome::Declined) {
        let path = match &args.audit_log {
            Some(path) => path.clone(),
            None => default_report_path(config, &report)?,
        };
        match save_report(&report, &path) {
            Ok(()) => log::info!("Run report written to {}", path.display()),
            Err(e) => ui::warn(&format!("Could not save run report: {e:#}")),
        }
    }

    summarize(&report, ctx.quiet);
    Ok(Status::from_outcome(&report.outcome))
}

/// Flags win over the config file
fn options(config: &Config, args: &ApplyArgs) -> ExecuteOptions {
    let configured = config.retry_policy();
    ExecuteOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(config.jobs).max(1),
        retry: RetryPolicy::new(
            args.retries.unwrap_or(configured.max_attempts),
            args.retry_delay.map_or(configured.delay, Duration::from_secs),
        ),
        target_root: args
            .target_root
            .clone()
            .unwrap_or_else(|| config.target_root()),
    }
}

fn default_report_path(config: &Config, report: &RunReport) -> Result<PathBuf> {
    let name = format!("{}.json", report.started_at.format("%Y%m%dT%H%M%SZ"));
    Ok(config.audit_dir()?.join(name))
}

fn save_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn summarize(report: &RunReport, quiet: bool) {
    let took = (report.finished_at - report.started_at)
        .to_std()
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    match &report.outcome {
        RunOutcome::Succeeded => {
            if !quiet {
                println!();
                ui::success(&format!(
                    "Provisioned in {} ({}, {} retried)",
                    ui::format_duration(took),
                    ui::count(report.succeeded_steps(), "step"),
                    report.failed_attempts()
                ));
            }
        }
        RunOutcome::DryRun => {}
        RunOutcome::Declined => ui::info("Cancelled"),
        RunOutcome::DirectiveFailed { id, reason } => {
            println!();
            ui::error(&format!("{id} failed: {reason}"));
            ui::dim("Steps already applied were not rolled back");
        }
        RunOutcome::ScriptFailed { reason, .. } => {
            println!();
            ui::error(&format!("Post-install script failed: {reason}"));
            // Tail of the script output
            if let Some(last) = report.results.last() {
                let lines: Vec<&str> = last.output.lines().collect();
                for line in &lines[lines.len().saturating_sub(10)..] {
                    ui::dim(line);
                }
            }
        }
    }
}
