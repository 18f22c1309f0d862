//! Stager CLI - a multi-stage Clang/LLVM toolchain build orchestrator

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("stager=debug")
    } else {
        EnvFilter::new("stager=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let global = commands::GlobalArgs {
        root: cli.root,
        config: cli.config,
    };

    match cli.command {
        Commands::Build(args) => commands::build::execute(&global, args),
        Commands::Flags(args) => commands::flags::execute(&global, args),
        Commands::Configs(args) => commands::configs::execute(&global, args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
