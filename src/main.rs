mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod sudo;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
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

    match cli.command {
        Command::Catalog => commands::catalog::run(&ctx),
        Command::Status => commands::selection::status(&ctx),
        Command::Select(args) => commands::selection::select(&ctx, args),
        Command::Defaults => commands::selection::defaults(&ctx),
        Command::Profile(cmd) => commands::profile::run(&ctx, cmd),
        Command::Pin(cmd) => commands::pin::run(&ctx, cmd),
        Command::Plan => commands::apply::plan(&ctx),
        Command::Apply(args) => commands::apply::apply(&ctx, args),
        Command::Audit { json } => commands::audit::run(&ctx, json),
        Command::Doctor => commands::doctor::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "hostkit", &mut io::stdout());
            Ok(())
        }
    }
}
