//! Demo scenarios and the registry that resolves them by name.
//!
//! A scenario decides what a freshly initialized demo database should contain.
//! Setup is best-effort: each stage runs in its own error boundary and a
//! failure is recorded in the [`SetupReport`] instead of aborting the rest.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::{AccountIdMap, Container, ContainerFactory, CoreError, DEMO_INTEGRATION, DEMO_PROVIDER};

/// A named strategy for populating the demo database.
pub trait Scenario: Send + Sync {
    /// Identifier used on the command line.
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Populate the demo database. Called once per fresh database.
    fn setup(&self, factory: &dyn ContainerFactory) -> SetupReport;
}

/// Steps a scenario may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStage {
    Container,
    Integration,
    Sync,
    BalanceHistory,
    Budget,
}

impl SetupStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStage::Container => "container",
            SetupStage::Integration => "integration",
            SetupStage::Sync => "sync",
            SetupStage::BalanceHistory => "balance_history",
            SetupStage::Budget => "budget",
        }
    }
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    Done(String),
    Skipped(String),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageResult {
    pub stage: SetupStage,
    pub status: StageStatus,
}

/// Outcome of every stage a scenario attempted, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub stages: Vec<StageResult>,
}

impl SetupReport {
    pub fn done(&mut self, stage: SetupStage, message: impl Into<String>) {
        let message = message.into();
        info!(stage = %stage, "{}", message);
        self.stages.push(StageResult {
            stage,
            status: StageStatus::Done(message),
        });
    }

    pub fn skipped(&mut self, stage: SetupStage, message: impl Into<String>) {
        let message = message.into();
        info!(stage = %stage, "skipped: {}", message);
        self.stages.push(StageResult {
            stage,
            status: StageStatus::Skipped(message),
        });
    }

    pub fn failed(&mut self, stage: SetupStage, message: impl Into<String>) {
        let message = message.into();
        warn!(stage = %stage, "{}", message);
        self.stages.push(StageResult {
            stage,
            status: StageStatus::Failed(message),
        });
    }

    /// Stages that failed, as `(stage, message)`.
    pub fn warnings(&self) -> impl Iterator<Item = (SetupStage, &str)> {
        self.stages.iter().filter_map(|r| match &r.status {
            StageStatus::Failed(msg) => Some((r.stage, msg.as_str())),
            _ => None,
        })
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Status recorded for `stage`, if it ran.
    pub fn status_of(&self, stage: SetupStage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.status)
    }
}

/// Empty database for testing the new user experience.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyScenario;

impl Scenario for EmptyScenario {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn description(&self) -> &'static str {
        "Empty database for testing new user experience"
    }

    fn setup(&self, _factory: &dyn ContainerFactory) -> SetupReport {
        // A freshly initialized database already is the empty scenario.
        SetupReport::default()
    }
}

/// Full sample data: demo integration, synced accounts and transactions,
/// generated balance history, and a budget.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultScenario;

impl DefaultScenario {
    fn ensure_demo_integration(container: &Container, report: &mut SetupReport) {
        let has_demo = match container.integration_service.get_integrations() {
            Ok(integrations) => integrations.iter().any(|i| i.name == DEMO_INTEGRATION),
            Err(e) => {
                warn!(error = %e, "could not list integrations; assuming demo is missing");
                false
            }
        };
        if has_demo {
            report.skipped(SetupStage::Integration, "demo integration already exists");
            return;
        }

        let Some(provider) = container.integration_provider(DEMO_PROVIDER) else {
            report.failed(SetupStage::Integration, "demo provider is not registered");
            return;
        };
        match container.integration_service.create_integration(
            provider.as_ref(),
            DEMO_INTEGRATION,
            Default::default(),
        ) {
            Ok(()) => report.done(SetupStage::Integration, "Created demo integration"),
            Err(e) => report.failed(SetupStage::Integration, e.to_string()),
        }
    }

    fn sync(container: &Container, report: &mut SetupReport) {
        info!("Syncing demo accounts and transactions...");
        match container.sync_service.sync_all_integrations() {
            Ok(summary) => report.done(
                SetupStage::Sync,
                format!(
                    "Demo data synced successfully ({} accounts, {} transactions)",
                    summary.accounts, summary.transactions
                ),
            ),
            Err(e) => report.failed(SetupStage::Sync, e.to_string()),
        }
    }

    fn balance_history(container: &Container, report: &mut SetupReport) {
        let accounts = match container.account_service.get_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                report.failed(SetupStage::BalanceHistory, e.to_string());
                return;
            }
        };

        let account_id_map: AccountIdMap = accounts
            .iter()
            .filter_map(|a| {
                a.external_id(DEMO_PROVIDER)
                    .map(|ext| (ext.to_string(), a.id.clone()))
            })
            .collect();
        if account_id_map.is_empty() {
            report.skipped(SetupStage::BalanceHistory, "no demo accounts to backfill");
            return;
        }

        info!(accounts = account_id_map.len(), "Generating balance history...");
        let sql = container
            .demo_data()
            .generate_demo_balance_history_sql(&account_id_map);
        if sql.trim().is_empty() {
            report.skipped(
                SetupStage::BalanceHistory,
                "no demo accounts have sample history",
            );
            return;
        }
        match container.db_service.execute_write_query(&sql) {
            Ok(()) => report.done(
                SetupStage::BalanceHistory,
                format!(
                    "Created balance history for {} accounts",
                    account_id_map.len()
                ),
            ),
            Err(e) => report.failed(SetupStage::BalanceHistory, e.to_string()),
        }
    }

    fn budget(container: &Container, report: &mut SetupReport) {
        info!("Setting up demo budget...");
        let sql = container.demo_data().generate_demo_budget_sql();
        match container.db_service.execute_write_query(&sql) {
            Ok(()) => report.done(SetupStage::Budget, "Demo budget configured"),
            Err(e) => report.failed(SetupStage::Budget, e.to_string()),
        }
    }
}

impl Scenario for DefaultScenario {
    fn name(&self) -> &'static str {
        "default"
    }

    fn description(&self) -> &'static str {
        "Full sample data (accounts, transactions, budget)"
    }

    fn setup(&self, factory: &dyn ContainerFactory) -> SetupReport {
        let mut report = SetupReport::default();
        let container = match factory.container() {
            Ok(c) => c,
            Err(e) => {
                report.failed(SetupStage::Container, e.to_string());
                return report;
            }
        };

        Self::ensure_demo_integration(&container, &mut report);
        Self::sync(&container, &mut report);
        Self::balance_history(&container, &mut report);
        Self::budget(&container, &mut report);
        report
    }
}

/// Closed set of scenarios, fixed at startup and keyed by scenario name.
#[derive(Clone)]
pub struct ScenarioRegistry {
    order: Vec<&'static str>,
    by_name: BTreeMap<&'static str, Arc<dyn Scenario>>,
}

impl ScenarioRegistry {
    /// Build a registry from an ordered list. Names must be unique.
    pub fn new(scenarios: Vec<Arc<dyn Scenario>>) -> Result<Self, CoreError> {
        let mut order = Vec::with_capacity(scenarios.len());
        let mut by_name = BTreeMap::new();
        for scenario in scenarios {
            let name = scenario.name();
            if by_name.insert(name, scenario).is_some() {
                return Err(CoreError::DuplicateScenario(name.to_string()));
            }
            order.push(name);
        }
        Ok(Self { order, by_name })
    }

    /// The scenarios shipped with the CLI.
    pub fn builtin() -> Self {
        let scenarios: [Arc<dyn Scenario>; 2] =
            [Arc::new(DefaultScenario), Arc::new(EmptyScenario)];
        Self {
            order: scenarios.iter().map(|s| s.name()).collect(),
            by_name: scenarios.into_iter().map(|s| (s.name(), s)).collect(),
        }
    }

    /// Exact-key lookup; callers normalize case first.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Scenario>, CoreError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownScenario(name.to_string()))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Scenario>> {
        self.order.iter().filter_map(|n| self.by_name.get(n))
    }

    /// "Available scenarios:" block for command help.
    pub fn help_text(&self) -> String {
        let mut lines = vec!["Available scenarios:".to_string()];
        for scenario in self.iter() {
            lines.push(format!(
                "  {:<10} - {}",
                scenario.name(),
                scenario.description()
            ));
        }
        lines.join("\n")
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
