use crate::Context;
use crate::cli::DocumentArgs;
use crate::commands::{Status, load_plan};
use crate::ui;
use anyhow::Result;

pub fn run(ctx: &Context, args: &DocumentArgs) -> Result<Status> {
    let (document, plan) = load_plan(&args.document)?;

    if ctx.quiet {
        return Ok(Status::Success);
    }

    ui::header(&format!("{}", args.document.display()));
    ui::kv("Directives", &document.directives.len().to_string());
    let packages = document.effective_packages();
    if !packages.is_empty() {
        ui::kv(
            "Packages",
            &format!(
                "{} to install, {} excluded",
                packages.install.len(),
                packages.exclude.len()
            ),
        );
    }
    if let Some(script) = &document.post_script {
        ui::kv(
            "Post script",
            &format!("{} via {}", ui::count(script.body.len(), "line"), script.interpreter()),
        );
    }

    println!();
    for (tier, steps) in plan.tiers() {
        ui::kv(tier.as_str(), &ui::count(steps.len(), "step"));
    }

    println!();
    ui::success(&format!(
        "Document is valid ({})",
        ui::count(plan.len(), "step")
    ));
    Ok(Status::Success)
}
