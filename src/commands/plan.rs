use crate::Context;
use crate::cli::PlanArgs;
use crate::commands::{Status, load_plan};
use crate::ui;
use anyhow::{Context as _, Result};
use colored::Colorize;
use provisioner::ExecutionPlan;

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<Status> {
    let (_, plan) = load_plan(&args.document)?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{json}");
        return Ok(Status::Success);
    }

    if plan.is_empty() {
        ui::info("Nothing to do.");
        return Ok(Status::Success);
    }

    if !ctx.quiet {
        ui::header(&format!("Plan for {}", args.document.display()));
    }
    print_plan(&plan);
    Ok(Status::Success)
}

/// Print the steps grouped by tier, numbered in execution order
pub fn print_plan(plan: &ExecutionPlan) {
    let total = plan.len();
    let mut num = 0;
    for (tier, steps) in plan.tiers() {
        ui::section(tier.as_str());
        for planned in steps {
            num += 1;
            ui::step(
                num,
                total,
                &format!(
                    "{} {}",
                    planned.step.description(),
                    format!("(line {})", planned.step.line()).dimmed()
                ),
            );
        }
    }
}
