mod cli;
mod config;
mod fixture;
mod metrics;
mod monitor;
mod report;
mod source;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::ConfigError;
use crate::monitor::{run_listen, run_replay};
use crate::source::SourceError;

/// Shows the startup line with the bound address unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_DIRECTIVES: &str = "info";

fn log_directives(from_env: Option<String>) -> String {
    from_env
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_DIRECTIVES.to_string())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_directives(std::env::var("RUST_LOG").ok())))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Some(Commands::Listen(listen)) => run_listen(listen),
        Some(Commands::Replay(replay)) => run_replay(replay),
        None => {
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(err) = result {
        // Map to stable exit codes
        let code = exit_code_for_error(&err);
        eprintln!("error: {err:?}");
        std::process::exit(code);
    }
}

pub(crate) fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    // 2: invalid configuration, 3: malformed fixture, 4: bind failure, 1: other
    for cause in err.chain() {
        if cause.is::<ConfigError>() {
            return 2;
        }
        if let Some(src) = cause.downcast_ref::<SourceError>() {
            return match src {
                SourceError::Fixture { .. } => 3,
                SourceError::Bind { .. } => 4,
                _ => 1,
            };
        }
        if let Some(ioe) = cause.downcast_ref::<std::io::Error>() {
            use std::io::ErrorKind::*;
            return match ioe.kind() {
                AddrInUse | AddrNotAvailable => 4,
                _ => 1,
            };
        }
    }
    1
}
