//! Execution engine - runs a plan tier by tier with bounded retry

use crate::capability::Subsystems;
use crate::context::{ConfirmCallback, ProgressCallback};
use crate::error::InvokeError;
use crate::invoker::invoker_for;
use crate::planner::{ExecutionPlan, PlannedStep, Step};
use crate::registry::Tier;
use crate::retry::{LogCallback, with_retry};
use crate::script::ScriptRunner;
use crate::types::{ExecuteOptions, ExecutionResult, RunOutcome, RunReport};
use anyhow::Result;
use chrono::Utc;
use rayon::prelude::*;
use std::time::{Duration, Instant};

/// Result of one step: every attempt, and how the last one ended
type StepRun = (Vec<ExecutionResult>, std::result::Result<(), InvokeError>);

/// Execute a plan against a set of subsystems
///
/// Steps run one at a time in plan order. When `opts.jobs > 1` the base
/// tier, whose directives touch disjoint configuration, runs on a rayon
/// pool instead; its results are still recorded in plan order.
///
/// The first fatal failure halts the run. Nothing already done is undone.
///
/// # Returns
/// The audit log. `Err` is reserved for failures of the engine itself
/// (confirmation prompt, thread pool), not of the steps.
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    subsystems: &Subsystems,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<RunReport>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let started_at = Utc::now();
    let mut results = Vec::new();

    if plan.is_empty() {
        return Ok(RunReport::new(RunOutcome::Succeeded, results, started_at));
    }

    if opts.dry_run {
        return Ok(RunReport::new(RunOutcome::DryRun, results, started_at));
    }

    let prompt = format!(
        "Apply {} step(s) to {}?",
        plan.len(),
        opts.target_root.display()
    );
    if !confirm.confirm(&prompt)? {
        return Ok(RunReport::new(RunOutcome::Declined, results, started_at));
    }

    for (tier, steps) in plan.tiers() {
        progress.on_tier_start(tier, steps.len());
        log::info!("Tier {tier}: {} step(s)", steps.len());

        let runs = if tier == Tier::Base && opts.jobs > 1 && steps.len() > 1 {
            run_parallel(steps, subsystems, opts)?
        } else {
            let mut runs = Vec::with_capacity(steps.len());
            for planned in steps {
                progress.on_step_start(&planned.step.id(), &planned.step.description());
                let run = run_step(planned, subsystems, opts);
                let failed = run.1.is_err();
                runs.push(run);
                if failed {
                    break;
                }
            }
            runs
        };

        // A parallel batch has already run every step, so record them all
        // before halting on the first failure in plan order
        let mut failure = None;
        for ((attempts, outcome), planned) in runs.into_iter().zip(steps) {
            for attempt in &attempts {
                progress.on_step_complete(attempt);
            }
            let exit_code = attempts.last().and_then(|r| r.exit_code);
            results.extend(attempts);

            if let Err(e) = outcome
                && failure.is_none()
            {
                failure = Some((planned, e, exit_code));
            }
        }

        progress.on_tier_complete(tier);

        if let Some((planned, error, exit_code)) = failure {
            log::error!("Halting: {} failed", planned.step.id());
            let outcome = halt(planned, error, exit_code);
            return Ok(RunReport::new(outcome, results, started_at));
        }
    }

    Ok(RunReport::new(RunOutcome::Succeeded, results, started_at))
}

fn halt(planned: &PlannedStep, error: InvokeError, exit_code: Option<i32>) -> RunOutcome {
    match planned.step {
        Step::PostScript(_) => RunOutcome::ScriptFailed {
            exit_code,
            reason: error.reason().to_string(),
        },
        _ => RunOutcome::DirectiveFailed {
            id: planned.step.id(),
            reason: error.reason().to_string(),
        },
    }
}

fn run_parallel(
    steps: &[PlannedStep],
    subsystems: &Subsystems,
    opts: &ExecuteOptions,
) -> Result<Vec<StepRun>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {}", e))?;

    // Indexed collect keeps plan order
    Ok(pool.install(|| {
        steps
            .par_iter()
            .map(|planned| run_step(planned, subsystems, opts))
            .collect()
    }))
}

/// Run one step to completion, recording every attempt
fn run_step(planned: &PlannedStep, subsystems: &Subsystems, opts: &ExecuteOptions) -> StepRun {
    let id = planned.step.id();

    if let Step::PostScript(script) = &planned.step {
        let started_at = Utc::now();
        let timer = Instant::now();
        let outcome = ScriptRunner::new(&opts.target_root).run(script, subsystems.shell.as_ref());
        let record = ExecutionResult::new(&id, planned.capability, 1, started_at, timer.elapsed());

        // Never retried: the body may not be idempotent
        return match outcome {
            Ok(output) if output.exit_code == 0 => {
                (vec![record.with_exit_code(0).succeeded(output.output)], Ok(()))
            }
            Ok(output) => {
                let reason = format!("script exited with status {}", output.exit_code);
                (
                    vec![record.with_exit_code(output.exit_code).failed(output.output)],
                    Err(InvokeError::fatal(reason)),
                )
            }
            Err(e) => {
                let reason = format!("script could not be run: {e}");
                (vec![record.failed(&reason)], Err(InvokeError::fatal(reason)))
            }
        };
    }

    let Some(invoker) = invoker_for(planned.capability) else {
        let reason = format!("no invoker for capability '{}'", planned.capability);
        let record = ExecutionResult::new(&id, planned.capability, 1, Utc::now(), Duration::ZERO);
        return (vec![record.failed(&reason)], Err(InvokeError::fatal(reason)));
    };

    let mut attempts = Vec::new();
    let outcome = with_retry(&opts.retry, Some(&LogCallback), |attempt| {
        log::debug!("{id}: attempt {attempt}");
        let started_at = Utc::now();
        let timer = Instant::now();
        let result = invoker.invoke(&planned.step, subsystems);
        let record = ExecutionResult::new(&id, planned.capability, attempt, started_at, timer.elapsed());
        attempts.push(match &result {
            Ok(output) => record.succeeded(output.as_str()),
            Err(e) => record.failed(e.reason()),
        });
        result
    });

    (attempts, outcome.map(|_| ()))
}

/// Execute without progress reporting or confirmation
pub fn execute_simple(
    plan: &ExecutionPlan,
    subsystems: &Subsystems,
    opts: &ExecuteOptions,
) -> Result<RunReport> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, subsystems, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoDecline, NoProgress};
    use crate::registry::Registry;
    use crate::retry::RetryPolicy;
    use crate::testing::Fake;

    const REFERENCE: &str = "selinux --enforcing\n\
        network --bootproto=dhcp\n\
        clearpart --all\n\
        part / --fstype=xfs --size=4096\n\
        %packages\ncore\ncloud-init\n%end\n\
        %post\nexit 0\n%end\n";

    fn plan(text: &str) -> ExecutionPlan {
        let document = kickstart::parse_string(text).unwrap();
        ExecutionPlan::build(&document, &Registry::builtin()).unwrap()
    }

    fn options(root: &std::path::Path) -> ExecuteOptions {
        ExecuteOptions {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            target_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_document_succeeds_in_order() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new();
        let report = execute_simple(&plan(REFERENCE), &fake.subsystems(), &options(root.path())).unwrap();

        assert_eq!(report.outcome, RunOutcome::Succeeded);
        assert_eq!(
            fake.calls(),
            vec![
                "settings.selinux enforcing",
                "network.apply eth0 Dhcp",
                "disk.clear all",
                "disk.partition / 4096 xfs -",
                "packages.install cloud-init,core",
                "shell.run /bin/sh",
            ]
        );
        assert_eq!(fake.scripts(), vec!["exit 0\n"]);
        let script = report.results.last().unwrap();
        assert_eq!(script.id, "post#5");
        assert!(script.success);
        assert_eq!(script.exit_code, Some(0));
        assert_eq!(script.attempt, 1);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let outcomes = |fake: Fake| {
            let root = tempfile::tempdir().unwrap();
            let report =
                execute_simple(&plan(REFERENCE), &fake.subsystems(), &options(root.path())).unwrap();
            let steps: Vec<(String, bool)> = report
                .results
                .iter()
                .map(|r| (r.id.clone(), r.success))
                .collect();
            (report.outcome, steps, fake.calls())
        };

        assert_eq!(outcomes(Fake::new()), outcomes(Fake::new()));
    }

    #[test]
    fn test_recoverable_failure_is_retried() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new().with_transient_failures(2);
        let report = execute_simple(
            &plan("repo --name=epel --baseurl=http://mirror/epel\n"),
            &fake.subsystems(),
            &options(root.path()),
        )
        .unwrap();

        assert!(report.is_success());
        let attempts: Vec<(u32, bool)> = report.results.iter().map(|r| (r.attempt, r.success)).collect();
        assert_eq!(attempts, vec![(1, false), (2, false), (3, true)]);
        assert_eq!(report.results[0].output, "mirror unreachable");
    }

    #[test]
    fn test_retries_exhausted_halts() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new().with_transient_failures(10);
        let report = execute_simple(
            &plan("repo --name=epel --baseurl=http://mirror/epel\nservices --enabled=sshd\n"),
            &fake.subsystems(),
            &options(root.path()),
        )
        .unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::DirectiveFailed {
                id: "repo#0".into(),
                reason: "gave up after 3 attempts: mirror unreachable".into()
            }
        );
        assert_eq!(report.results.len(), 3);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_fatal_failure_halts_without_retry() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new();
        let report = execute_simple(
            &plan("clearpart --all\npart / --size=lots\nservices --enabled=sshd\n"),
            &fake.subsystems(),
            &options(root.path()),
        )
        .unwrap();

        assert!(matches!(
            report.outcome,
            RunOutcome::DirectiveFailed { ref id, .. } if id == "part:/#1"
        ));
        // clearpart stays done
        assert_eq!(fake.calls(), vec!["disk.clear all"]);
        assert_eq!(report.results.len(), 2);
    }

    #[test]
    fn test_script_exit_one_halts() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new().with_exit_code(1);
        let report = execute_simple(&plan(REFERENCE), &fake.subsystems(), &options(root.path())).unwrap();

        assert_eq!(
            report.outcome,
            RunOutcome::ScriptFailed {
                exit_code: Some(1),
                reason: "script exited with status 1".into()
            }
        );
        let script = report.results.last().unwrap();
        assert!(!script.success);
        assert_eq!(script.attempt, 1);
        assert_eq!(fake.scripts().len(), 1);
    }

    #[test]
    fn test_missing_clearpart_rejected_before_any_invocation() {
        let document = kickstart::parse_string("selinux --enforcing\npart / --size=1024\n").unwrap();
        let result = ExecutionPlan::build(&document, &Registry::builtin());
        assert!(matches!(
            result,
            Err(crate::Error::CyclicOrUnsatisfiableDependency { .. })
        ));
    }

    #[test]
    fn test_dry_run_and_decline_touch_nothing() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new();
        let opts = ExecuteOptions {
            dry_run: true,
            ..options(root.path())
        };
        let report = execute_simple(&plan(REFERENCE), &fake.subsystems(), &opts).unwrap();
        assert_eq!(report.outcome, RunOutcome::DryRun);

        let report = execute(
            &plan(REFERENCE),
            &fake.subsystems(),
            &options(root.path()),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(report.outcome, RunOutcome::Declined);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_parallel_base_tier_keeps_plan_order() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new();
        let opts = ExecuteOptions {
            jobs: 4,
            ..options(root.path())
        };
        let report = execute_simple(
            &plan(
                "selinux --enforcing\nlang en_US.UTF-8\nkeyboard us\n\
                 timezone UTC\nfirewall --enabled\nservices --enabled=sshd\n",
            ),
            &fake.subsystems(),
            &opts,
        )
        .unwrap();

        assert!(report.is_success());
        let ids: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "selinux#0",
                "lang:en_US.UTF-8#1",
                "keyboard:us#2",
                "timezone:UTC#3",
                "firewall#4",
                "services#5"
            ]
        );
        assert_eq!(fake.calls().last().unwrap(), "services.enable sshd");
    }

    #[test]
    fn test_parallel_failure_still_records_whole_batch() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new().failing("settings");
        let opts = ExecuteOptions {
            jobs: 4,
            ..options(root.path())
        };
        let report = execute_simple(
            &plan("selinux --enforcing
firewall --enabled
services --enabled=sshd
"),
            &fake.subsystems(),
            &opts,
        )
        .unwrap();

        assert!(matches!(
            report.outcome,
            RunOutcome::DirectiveFailed { ref id, .. } if id == "selinux#0"
        ));
        let recorded: Vec<(&str, bool)> = report
            .results
            .iter()
            .map(|r| (r.id.as_str(), r.success))
            .collect();
        assert_eq!(recorded, vec![("selinux#0", false), ("firewall#1", true)]);
        // The services tier never starts
        assert_eq!(fake.calls(), vec!["firewall.apply enabled"]);
    }

    #[test]
    fn test_report_json_masks_root_password() {
        let root = tempfile::tempdir().unwrap();
        let fake = Fake::new().failing("auth");
        let report = execute_simple(
            &plan("rootpw --plaintext s3cretPW
"),
            &fake.subsystems(),
            &options(root.path()),
        )
        .unwrap();

        assert!(matches!(
            report.outcome,
            RunOutcome::DirectiveFailed { ref id, .. } if id == "rootpw#0"
        ));
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("s3cretPW"));
    }

    #[test]
    fn test_progress_sees_every_tier() {
        #[derive(Default)]
        struct Recorder(Vec<String>);
        impl ProgressCallback for Recorder {
            fn on_tier_start(&mut self, tier: Tier, count: usize) {
                self.0.push(format!("start {tier} {count}"));
            }
            fn on_step_start(&mut self, id: &str, _description: &str) {
                self.0.push(format!("step {id}"));
            }
            fn on_step_complete(&mut self, result: &ExecutionResult) {
                self.0.push(format!("done {} {}", result.id, result.success));
            }
            fn on_tier_complete(&mut self, tier: Tier) {
                self.0.push(format!("end {tier}"));
            }
        }

        let root = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::default();
        execute(
            &plan("clearpart --all\nselinux --disabled\n"),
            &Fake::new().subsystems(),
            &options(root.path()),
            &mut recorder,
            &mut crate::context::AutoConfirm,
        )
        .unwrap();

        assert_eq!(
            recorder.0,
            vec![
                "start base 1",
                "step selinux#1",
                "done selinux#1 true",
                "end base",
                "start storage 1",
                "step clearpart#0",
                "done clearpart#0 true",
                "end storage",
            ]
        );
    }
}
