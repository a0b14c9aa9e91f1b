mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod runner;
mod system;
mod ui;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::Status;
use config::Config;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let result = match cli.command {
        Command::Check(args) => commands::check::run(&ctx, &args),
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Fmt(args) => commands::fmt::run(&ctx, &args),
        Command::Apply(args) => Config::load(cli.config.as_deref())
            .and_then(|config| commands::apply::run(&ctx, &config, args)),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "kickstand", &mut io::stdout());
            Ok(Status::Success)
        }
    };

    match result {
        Ok(status) => status.into(),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if ctx.verbose > 0 {
                log::debug!("{e:?}");
            }
            Status::from_error(&e).into()
        }
    }
}
