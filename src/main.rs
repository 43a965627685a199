mod cli;
mod commands;
mod config;
mod paths;
mod playbook;
mod progress;
mod state;
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

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "kubefleet", &mut io::stdout());
        return Ok(());
    }

    let config = config::Config::load()?;

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, &config, args),
        Command::Inventory(cmd) => commands::inventory::run(&config, cmd),
        Command::Batch(args) => commands::batch::run(args),
        Command::Status { run_id } => commands::status::run(&config, run_id.as_deref()),
        Command::Completions { .. } => Ok(()),
    }
}
