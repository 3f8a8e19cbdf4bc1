//! `tl demo`: wires the provisioner to the SQLite collaborators and renders
//! its outcome for the operator.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use domain::lifecycle::{DemoDatabase, DEMO_DB_FILE};
use domain::provisioner::{DemoOutcome, DemoProvisioner};
use domain::scenario::{ScenarioRegistry, StageStatus};
use domain::{ContainerFactory, CoreError, DemoModeStore, DemoStorage, SchemaInitializer};
use sqlite_adapter::DemoProvider;

use crate::cli::DemoArgs;
use crate::config::{Config, REAL_DB_FILE};
use crate::container::SqliteContainerFactory;
use crate::settings::FileDemoModeStore;

type CliProvisioner = DemoProvisioner<
    Arc<FileDemoModeStore>,
    DemoDatabase,
    Arc<SqliteContainerFactory>,
    Arc<SqliteContainerFactory>,
>;

fn provisioner(config: &Config) -> CliProvisioner {
    let mode = Arc::new(FileDemoModeStore::new(config.settings_path()));
    let factory = Arc::new(SqliteContainerFactory::new(
        config,
        mode.clone(),
        DemoProvider::today(),
    ));
    DemoProvisioner::new(
        ScenarioRegistry::builtin(),
        mode,
        DemoDatabase::new(config.demo_db_paths()),
        factory.clone(),
        factory,
    )
}

/// Run `tl demo`. Bad operator input yields a failure exit code after a
/// message; anything that stops the transition itself is returned as an error.
pub fn run<W: Write>(config: &Config, args: &DemoArgs, out: &mut W) -> anyhow::Result<ExitCode> {
    run_with(&provisioner(config), args, out)
}

fn run_with<M, S, F, I, W>(
    provisioner: &DemoProvisioner<M, S, F, I>,
    args: &DemoArgs,
    out: &mut W,
) -> anyhow::Result<ExitCode>
where
    M: DemoModeStore,
    S: DemoStorage,
    F: ContainerFactory,
    I: SchemaInitializer,
    W: Write,
{
    match provisioner.run(args.action(), &args.scenario()) {
        Ok(outcome) => {
            render(&outcome, out)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if err.is_usage() => {
            render_usage_error(&err, provisioner.registry(), out)?;
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err).with_context(|| format!("tl demo {} failed", args.action())),
    }
}

fn render<W: Write>(outcome: &DemoOutcome, out: &mut W) -> std::io::Result<()> {
    match outcome {
        DemoOutcome::Status { enabled: true } => {
            writeln!(out, "Demo mode is {}", "ON".green().bold())?;
            writeln!(out, "{}", format!("Using {DEMO_DB_FILE} with sample data").dimmed())?;
        }
        DemoOutcome::Status { enabled: false } => {
            writeln!(out, "Demo mode is {}", "OFF".bold())?;
            writeln!(out, "{}", format!("Using {REAL_DB_FILE}").dimmed())?;
        }
        DemoOutcome::Enabled {
            scenario,
            description,
            report,
            storage_warnings,
        } => {
            for warning in storage_warnings {
                writeln!(out, "{} {warning}", "Note:".yellow())?;
            }
            for stage in &report.stages {
                match &stage.status {
                    StageStatus::Done(msg) => writeln!(out, "  {msg}")?,
                    StageStatus::Skipped(_) => {}
                    StageStatus::Failed(msg) => writeln!(out, "{} {msg}", "Note:".yellow())?,
                }
            }
            writeln!(out, "{}", "Demo mode enabled".green().bold())?;
            writeln!(out, "Scenario: {} - {description}", scenario.bold())?;
            writeln!(out, "{}", "Run 'tl demo off' to return to real data".dimmed())?;
        }
        DemoOutcome::Disabled => {
            writeln!(out, "{}", "Demo mode disabled".green())?;
            writeln!(out, "{}", format!("Using {REAL_DB_FILE}").dimmed())?;
        }
        DemoOutcome::AlreadyDisabled => {
            writeln!(out, "{}", "Demo mode is already disabled".dimmed())?;
        }
    }
    Ok(())
}

fn render_usage_error<W: Write>(
    err: &CoreError,
    registry: &ScenarioRegistry,
    out: &mut W,
) -> std::io::Result<()> {
    writeln!(out, "{}", err.to_string().red())?;
    match err {
        CoreError::UnknownAction(_) => writeln!(out, "Use 'on', 'off', or 'status'"),
        _ => writeln!(out, "Available scenarios: {}", registry.names().join(", ")),
    }
}
