//! tl: Treeline command-line interface.
//!
//! Currently hosts `tl demo`, which switches between the real database and an
//! isolated demo database seeded from a named scenario.
//!
//! Run:
//! ```bash
//! tl demo                  # show whether demo mode is on
//! tl demo on -s empty      # fresh demo database with no data
//! RUST_LOG=info tl demo on # show setup progress on stderr
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod cli;
mod config;
mod container;
mod demo;
mod settings;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::cli::{Cli, Command};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&cfg);

    match dispatch(cli, &cfg) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli, cfg: &config::Config) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Demo(args) => demo::run(cfg, &args, &mut io::stdout().lock()),
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(io::stderr),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(io::stderr),
                )
                .init();
        }
    }
}
