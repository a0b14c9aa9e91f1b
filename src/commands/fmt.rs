use crate::Context;
use crate::cli::FmtArgs;
use crate::commands::Status;
use crate::ui;
use anyhow::{Context as _, Result};

pub fn run(ctx: &Context, args: &FmtArgs) -> Result<Status> {
    let document = kickstart::parse_file(&args.document)
        .with_context(|| format!("Failed to read {}", args.document.display()))?;

    if !args.write {
        print!("{}", kickstart::write_string(&document));
        return Ok(Status::Success);
    }

    kickstart::write_file(&document, &args.document)
        .with_context(|| format!("Failed to write {}", args.document.display()))?;
    if !ctx.quiet {
        ui::success(&format!("Formatted {}", args.document.display()));
    }
    Ok(Status::Success)
}
