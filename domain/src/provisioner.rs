use std::sync::Arc;

use tracing::{info, warn};

use crate::scenario::{Scenario, ScenarioRegistry, SetupReport};
use crate::{ContainerFactory, CoreError, DemoModeStore, DemoStorage, SchemaInitializer};

/// Operator-requested transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemoAction {
    Status,
    On,
    Off,
}

impl DemoAction {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.to_lowercase().as_str() {
            "status" => Ok(DemoAction::Status),
            "on" => Ok(DemoAction::On),
            "off" => Ok(DemoAction::Off),
            _ => Err(CoreError::UnknownAction(s.to_string())),
        }
    }
}

/// Result of a successful provisioner call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DemoOutcome {
    Status {
        enabled: bool,
    },
    Enabled {
        scenario: &'static str,
        description: &'static str,
        report: SetupReport,
        /// Problems removing the previous demo database.
        storage_warnings: Vec<String>,
    },
    Disabled,
    AlreadyDisabled,
}

impl DemoOutcome {
    /// Number of non-fatal problems to surface to the operator.
    pub fn warning_count(&self) -> usize {
        match self {
            DemoOutcome::Enabled {
                report,
                storage_warnings,
                ..
            } => report.warnings().count() + storage_warnings.len(),
            _ => 0,
        }
    }
}

/// Drives the status/on/off transitions of demo mode.
///
/// Activation always rebuilds the demo database from scratch: the old files
/// are deleted, the flag is flipped, the container is rebound, the schema is
/// created, and only then does the scenario populate data. The order matters
/// because initialization acts on whichever database the flag selects.
pub struct DemoProvisioner<M, S, F, I>
where
    M: DemoModeStore,
    S: DemoStorage,
    F: ContainerFactory,
    I: SchemaInitializer,
{
    registry: ScenarioRegistry,
    mode: M,
    storage: S,
    factory: F,
    initializer: I,
}

impl<M, S, F, I> DemoProvisioner<M, S, F, I>
where
    M: DemoModeStore,
    S: DemoStorage,
    F: ContainerFactory,
    I: SchemaInitializer,
{
    pub fn new(
        registry: ScenarioRegistry,
        mode: M,
        storage: S,
        factory: F,
        initializer: I,
    ) -> Self {
        Self {
            registry,
            mode,
            storage,
            factory,
            initializer,
        }
    }

    pub fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Parse `action` and run it. `scenario` only matters for `on`.
    pub fn run(&self, action: &str, scenario: &str) -> Result<DemoOutcome, CoreError> {
        match DemoAction::parse(action)? {
            DemoAction::Status => self.status(),
            DemoAction::On => self.enable(scenario),
            DemoAction::Off => self.disable(),
        }
    }

    pub fn status(&self) -> Result<DemoOutcome, CoreError> {
        Ok(DemoOutcome::Status {
            enabled: self.mode.is_demo_mode()?,
        })
    }

    pub fn enable(&self, scenario_name: &str) -> Result<DemoOutcome, CoreError> {
        let scenario: Arc<dyn Scenario> = self.registry.resolve(scenario_name)?;
        info!(scenario = scenario.name(), "enabling demo mode");

        let storage_warnings = self.storage.delete();
        self.mode.set_demo_mode(true)?;
        self.factory.reset();
        self.initializer.ensure_initialized()?;

        let report = scenario.setup(&self.factory);
        if report.has_warnings() {
            warn!(
                scenario = scenario.name(),
                warnings = report.warnings().count(),
                "demo scenario finished with warnings"
            );
        }
        Ok(DemoOutcome::Enabled {
            scenario: scenario.name(),
            description: scenario.description(),
            report,
            storage_warnings,
        })
    }

    /// Switch back to real data. The demo database is left in place.
    pub fn disable(&self) -> Result<DemoOutcome, CoreError> {
        if !self.mode.is_demo_mode()? {
            return Ok(DemoOutcome::AlreadyDisabled);
        }
        self.mode.set_demo_mode(false)?;
        self.factory.reset();
        info!("demo mode disabled");
        Ok(DemoOutcome::Disabled)
    }
}
