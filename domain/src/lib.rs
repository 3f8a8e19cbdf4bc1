//! Domain library for the Treeline demo-mode provisioner.
//!
//! This crate holds the domain types, ports (traits), and error definitions
//! for switching between real data and an isolated demo database. Concrete
//! persistence and provider adapters live in separate crates; only the
//! demo-database file lifecycle touches the filesystem from here.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider name used for the built-in sample-data integration.
pub const DEMO_PROVIDER: &str = "demo";

/// Integration name the default scenario creates for the demo provider.
pub const DEMO_INTEGRATION: &str = "demo";

/// Free-form integration configuration payload.
pub type IntegrationSettings = BTreeMap<String, String>;

/// Maps a provider's external account id to the internal account id.
pub type AccountIdMap = BTreeMap<String, String>;

/// A configured connection to a data provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    #[serde(rename = "integrationName")]
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub settings: IntegrationSettings,
}

/// A financial account as stored in the active database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub institution: Option<String>,
    pub currency: String,
    pub balance_cents: i64,
    /// Provider name -> that provider's id for this account.
    pub external_ids: BTreeMap<String, String>,
}

impl Account {
    pub fn external_id(&self, provider: &str) -> Option<&str> {
        self.external_ids.get(provider).map(String::as_str)
    }
}

/// Account as reported by a provider during sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderAccount {
    pub external_id: String,
    pub name: String,
    pub institution: Option<String>,
    pub currency: String,
    pub balance_cents: i64,
}

/// Transaction as reported by a provider during sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderTransaction {
    pub external_id: String,
    pub account_external_id: String,
    pub posted: NaiveDate,
    pub amount_cents: i64,
    pub description: String,
}

/// Everything a provider returns for one integration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderSnapshot {
    pub accounts: Vec<ProviderAccount>,
    pub transactions: Vec<ProviderTransaction>,
}

/// Counts produced by a sync run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub integrations: usize,
    pub accounts: usize,
    pub transactions: usize,
}

/// Port for managing configured integrations.
pub trait IntegrationService: Send + Sync {
    fn get_integrations(&self) -> Result<Vec<Integration>, CoreError>;
    fn create_integration(
        &self,
        provider: &dyn IntegrationProvider,
        name: &str,
        settings: IntegrationSettings,
    ) -> Result<(), CoreError>;
}

/// Port for pulling data from every configured integration.
pub trait SyncService: Send + Sync {
    fn sync_all_integrations(&self) -> Result<SyncSummary, CoreError>;
}

/// Port for reading accounts from the active database.
pub trait AccountService: Send + Sync {
    fn get_accounts(&self) -> Result<Vec<Account>, CoreError>;
}

/// Port for raw write statements against the active database.
pub trait DbService: Send + Sync {
    fn execute_write_query(&self, sql: &str) -> Result<(), CoreError>;
}

/// A source of accounts and transactions.
pub trait IntegrationProvider: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, settings: &IntegrationSettings) -> Result<ProviderSnapshot, CoreError>;
}

/// Generates the write statements that seed demo-only tables.
pub trait DemoDataGenerator: Send + Sync {
    fn generate_demo_balance_history_sql(&self, account_id_map: &AccountIdMap) -> String;
    fn generate_demo_budget_sql(&self) -> String;
}

/// Set of service handles bound to whichever database is currently active.
#[derive(Clone)]
pub struct Container {
    pub integration_service: Arc<dyn IntegrationService>,
    pub sync_service: Arc<dyn SyncService>,
    pub account_service: Arc<dyn AccountService>,
    pub db_service: Arc<dyn DbService>,
    providers: BTreeMap<String, Arc<dyn IntegrationProvider>>,
    demo_data: Arc<dyn DemoDataGenerator>,
}

impl Container {
    pub fn new(
        integration_service: Arc<dyn IntegrationService>,
        sync_service: Arc<dyn SyncService>,
        account_service: Arc<dyn AccountService>,
        db_service: Arc<dyn DbService>,
        demo_data: Arc<dyn DemoDataGenerator>,
    ) -> Self {
        Self {
            integration_service,
            sync_service,
            account_service,
            db_service,
            providers: BTreeMap::new(),
            demo_data,
        }
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn IntegrationProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn integration_provider(&self, name: &str) -> Option<Arc<dyn IntegrationProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn demo_data(&self) -> Arc<dyn DemoDataGenerator> {
        Arc::clone(&self.demo_data)
    }
}

/// Lazily builds the service container for the active database.
pub trait ContainerFactory: Send + Sync {
    fn container(&self) -> Result<Container, CoreError>;
    /// Drop any cached container so the next call rebinds to the database the
    /// demo-mode flag currently selects.
    fn reset(&self);
}

/// Prepares the schema of the active database.
pub trait SchemaInitializer: Send + Sync {
    fn ensure_initialized(&self) -> Result<(), CoreError>;
}

/// Durable, process-wide demo-mode flag.
pub trait DemoModeStore: Send + Sync {
    fn is_demo_mode(&self) -> Result<bool, CoreError>;
    fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError>;
}

/// Disposable storage backing demo mode.
pub trait DemoStorage: Send + Sync {
    /// Remove all demo storage. Best-effort: problems are returned as
    /// warnings, never as an error.
    fn delete(&self) -> Vec<String>;
}

impl<T: ContainerFactory + ?Sized> ContainerFactory for Arc<T> {
    fn container(&self) -> Result<Container, CoreError> {
        (**self).container()
    }

    fn reset(&self) {
        (**self).reset()
    }
}

impl<T: SchemaInitializer + ?Sized> SchemaInitializer for Arc<T> {
    fn ensure_initialized(&self) -> Result<(), CoreError> {
        (**self).ensure_initialized()
    }
}

impl<T: DemoModeStore + ?Sized> DemoModeStore for Arc<T> {
    fn is_demo_mode(&self) -> Result<bool, CoreError> {
        (**self).is_demo_mode()
    }

    fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError> {
        (**self).set_demo_mode(enabled)
    }
}

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("duplicate scenario name: {0}")]
    DuplicateScenario(String),
    #[error("repository error: {0}")]
    Repository(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("demo mode state error: {0}")]
    State(String),
    #[error("database initialization failed: {0}")]
    Initialization(String),
}

impl CoreError {
    /// True for errors caused by bad operator input, raised before any mutation.
    pub fn is_usage(&self) -> bool {
        matches!(self, CoreError::UnknownScenario(_) | CoreError::UnknownAction(_))
    }
}

pub mod adapters;
pub mod lifecycle;
pub mod provisioner;
pub mod scenario;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_are_flagged() {
        assert!(CoreError::UnknownScenario("x".into()).is_usage());
        assert!(CoreError::UnknownAction("reset".into()).is_usage());
        assert!(!CoreError::Repository("boom".into()).is_usage());
        assert!(!CoreError::Initialization("boom".into()).is_usage());
    }

    #[test]
    fn account_external_id_lookup() {
        let mut external_ids = BTreeMap::new();
        external_ids.insert(DEMO_PROVIDER.to_string(), "demo-checking".to_string());
        let account = Account {
            id: "a1".into(),
            name: "Checking".into(),
            institution: None,
            currency: "USD".into(),
            balance_cents: 0,
            external_ids,
        };
        assert_eq!(account.external_id("demo"), Some("demo-checking"));
        assert_eq!(account.external_id("simplefin"), None);
    }

    #[test]
    fn integration_uses_wire_field_name() {
        let parsed: Integration =
            serde_json::from_str(r#"{"integrationName":"demo","provider":"demo"}"#).unwrap();
        assert_eq!(parsed.name, "demo");
        assert!(parsed.settings.is_empty());
    }
}
