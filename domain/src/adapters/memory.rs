use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Account, AccountIdMap, AccountService, Container, ContainerFactory, CoreError,
    DbService, DemoDataGenerator, DemoModeStore, DemoStorage, Integration, IntegrationProvider,
    IntegrationService, IntegrationSettings, ProviderSnapshot, SchemaInitializer, SyncService,
    SyncSummary, DEMO_PROVIDER,
};

/// A call observed by one of the in-memory adapters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    DeleteStorage,
    SetDemoMode(bool),
    ResetContainer,
    EnsureInitialized,
    GetIntegrations,
    CreateIntegration(String),
    Sync,
    GetAccounts,
    Write(String),
}

/// Shared, ordered record of calls across adapters.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[derive(Default)]
struct State {
    integrations: Vec<Integration>,
    accounts: Vec<Account>,
    writes: Vec<String>,
    next_account: u64,
    fail_list_integrations: Option<String>,
    fail_create_integration: Option<String>,
    fail_sync: Option<String>,
    fail_accounts: Option<String>,
    fail_writes: Option<String>,
}

/// In-memory stand-in for the integration, sync, account, and db services of
/// one demo database. Failures can be injected per service.
#[derive(Clone)]
pub struct MemoryServices {
    state: Arc<Mutex<State>>,
    journal: Journal,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::with_journal(Journal::new())
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            journal,
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, CoreError> {
        self.state
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    fn with_state<F: FnOnce(&mut State)>(&self, f: F) {
        f(&mut self.state.lock().unwrap_or_else(|p| p.into_inner()));
    }

    pub fn add_integration(&self, name: &str, provider: &str) {
        self.with_state(|s| {
            s.integrations.push(Integration {
                name: name.to_string(),
                provider: provider.to_string(),
                settings: IntegrationSettings::new(),
            })
        });
    }

    pub fn seed_demo_account(&self, external_id: &str) {
        self.seed_foreign_account(DEMO_PROVIDER, external_id);
    }

    pub fn seed_foreign_account(&self, provider: &str, external_id: &str) {
        self.with_state(|s| insert_account(s, provider, external_id));
    }

    pub fn fail_list_integrations(&self, msg: &str) {
        self.with_state(|s| s.fail_list_integrations = Some(msg.to_string()));
    }

    pub fn fail_create_integration(&self, msg: &str) {
        self.with_state(|s| s.fail_create_integration = Some(msg.to_string()));
    }

    pub fn fail_sync(&self, msg: &str) {
        self.with_state(|s| s.fail_sync = Some(msg.to_string()));
    }

    pub fn fail_accounts(&self, msg: &str) {
        self.with_state(|s| s.fail_accounts = Some(msg.to_string()));
    }

    pub fn fail_writes(&self, msg: &str) {
        self.with_state(|s| s.fail_writes = Some(msg.to_string()));
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .accounts
            .clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .writes
            .clone()
    }

    /// Drop all stored data, keeping injected failures.
    pub fn wipe(&self) {
        self.with_state(|s| {
            s.integrations.clear();
            s.accounts.clear();
            s.writes.clear();
        });
    }
}

impl Default for MemoryServices {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_account(state: &mut State, provider: &str, external_id: &str) {
    state.next_account += 1;
    let mut external_ids = BTreeMap::new();
    external_ids.insert(provider.to_string(), external_id.to_string());
    state.accounts.push(Account {
        id: format!("acct-{}", state.next_account),
        name: external_id.to_string(),
        institution: None,
        currency: "USD".into(),
        balance_cents: 0,
        external_ids,
    });
}

impl IntegrationService for MemoryServices {
    fn get_integrations(&self) -> Result<Vec<Integration>, CoreError> {
        self.journal.record(Event::GetIntegrations);
        let state = self.lock()?;
        if let Some(msg) = &state.fail_list_integrations {
            return Err(CoreError::Repository(msg.clone()));
        }
        Ok(state.integrations.clone())
    }

    fn create_integration(
        &self,
        provider: &dyn IntegrationProvider,
        name: &str,
        settings: IntegrationSettings,
    ) -> Result<(), CoreError> {
        self.journal.record(Event::CreateIntegration(name.to_string()));
        let mut state = self.lock()?;
        if let Some(msg) = &state.fail_create_integration {
            return Err(CoreError::Repository(msg.clone()));
        }
        if state.integrations.iter().any(|i| i.name == name) {
            return Err(CoreError::Repository(format!("integration {name} exists")));
        }
        state.integrations.push(Integration {
            name: name.to_string(),
            provider: provider.name().to_string(),
            settings,
        });
        Ok(())
    }
}

impl SyncService for MemoryServices {
    /// Each demo integration contributes a checking and a savings account.
    fn sync_all_integrations(&self) -> Result<SyncSummary, CoreError> {
        self.journal.record(Event::Sync);
        let mut state = self.lock()?;
        if let Some(msg) = &state.fail_sync {
            return Err(CoreError::Provider(msg.clone()));
        }
        let demo_integrations = state
            .integrations
            .iter()
            .filter(|i| i.provider == DEMO_PROVIDER)
            .count();
        let mut accounts = 0;
        if demo_integrations > 0 {
            for ext in ["demo-checking", "demo-savings"] {
                let known = state
                    .accounts
                    .iter()
                    .any(|a| a.external_id(DEMO_PROVIDER) == Some(ext));
                if !known {
                    insert_account(&mut state, DEMO_PROVIDER, ext);
                }
                accounts += 1;
            }
        }
        Ok(SyncSummary {
            integrations: state.integrations.len(),
            accounts,
            transactions: 0,
        })
    }
}

impl AccountService for MemoryServices {
    fn get_accounts(&self) -> Result<Vec<Account>, CoreError> {
        self.journal.record(Event::GetAccounts);
        let state = self.lock()?;
        if let Some(msg) = &state.fail_accounts {
            return Err(CoreError::Repository(msg.clone()));
        }
        Ok(state.accounts.clone())
    }
}

impl DbService for MemoryServices {
    fn execute_write_query(&self, sql: &str) -> Result<(), CoreError> {
        self.journal.record(Event::Write(sql.to_string()));
        let mut state = self.lock()?;
        if let Some(msg) = &state.fail_writes {
            return Err(CoreError::Repository(msg.clone()));
        }
        state.writes.push(sql.to_string());
        Ok(())
    }
}

/// Demo provider whose generated statements are just their stage names.
/// Only external ids starting with `demo-` have balance history.
#[derive(Default)]
pub struct StaticDemoData {
    last_map: Mutex<Option<AccountIdMap>>,
}

impl StaticDemoData {
    /// Account-ID map passed to the last balance-history request.
    pub fn last_account_id_map(&self) -> Option<AccountIdMap> {
        self.last_map
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl IntegrationProvider for StaticDemoData {
    fn name(&self) -> &str {
        DEMO_PROVIDER
    }

    fn fetch(&self, _settings: &IntegrationSettings) -> Result<ProviderSnapshot, CoreError> {
        Ok(ProviderSnapshot::default())
    }
}

impl DemoDataGenerator for StaticDemoData {
    fn generate_demo_balance_history_sql(&self, account_id_map: &AccountIdMap) -> String {
        *self.last_map.lock().unwrap_or_else(|p| p.into_inner()) = Some(account_id_map.clone());
        if account_id_map.keys().any(|k| k.starts_with("demo-")) {
            "balance_history".to_string()
        } else {
            String::new()
        }
    }

    fn generate_demo_budget_sql(&self) -> String {
        "budget".to_string()
    }
}

/// Hands out containers over a [`MemoryServices`] and counts constructions.
pub struct MemoryContainerFactory {
    services: MemoryServices,
    demo: Arc<StaticDemoData>,
    built: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl MemoryContainerFactory {
    pub fn new(services: MemoryServices) -> Self {
        Self {
            services,
            demo: Arc::new(StaticDemoData::default()),
            built: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, msg: &str) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(msg.to_string());
    }

    pub fn containers_built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn demo_data(&self) -> &StaticDemoData {
        &self.demo
    }
}

impl ContainerFactory for MemoryContainerFactory {
    fn container(&self) -> Result<Container, CoreError> {
        if let Some(msg) = self
            .failure
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?
            .clone()
        {
            return Err(CoreError::Repository(msg));
        }
        self.built.fetch_add(1, Ordering::SeqCst);
        let services = Arc::new(self.services.clone());
        Ok(Container::new(
            services.clone(),
            services.clone(),
            services.clone(),
            services,
            self.demo.clone(),
        )
        .with_provider(self.demo.clone()))
    }

    fn reset(&self) {
        self.services.journal.record(Event::ResetContainer);
    }
}

/// Demo-mode flag held in memory.
pub struct InMemoryDemoModeStore {
    enabled: AtomicBool,
    journal: Journal,
}

impl InMemoryDemoModeStore {
    pub fn new(enabled: bool, journal: Journal) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            journal,
        }
    }

    pub fn get(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl DemoModeStore for InMemoryDemoModeStore {
    fn is_demo_mode(&self) -> Result<bool, CoreError> {
        Ok(self.get())
    }

    fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError> {
        self.journal.record(Event::SetDemoMode(enabled));
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

/// Demo storage backed by a [`MemoryServices`]; deleting wipes its data.
pub struct MemoryStorage {
    services: MemoryServices,
}

impl MemoryStorage {
    pub fn new(services: MemoryServices) -> Self {
        Self { services }
    }
}

impl DemoStorage for MemoryStorage {
    fn delete(&self) -> Vec<String> {
        self.services.journal.record(Event::DeleteStorage);
        self.services.wipe();
        Vec::new()
    }
}

/// Schema initializer that only records that it ran.
pub struct RecordingInitializer {
    journal: Journal,
    failure: Option<String>,
}

impl RecordingInitializer {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            failure: None,
        }
    }

    pub fn failing(journal: Journal, msg: &str) -> Self {
        Self {
            journal,
            failure: Some(msg.to_string()),
        }
    }
}

impl SchemaInitializer for RecordingInitializer {
    fn ensure_initialized(&self) -> Result<(), CoreError> {
        self.journal.record(Event::EnsureInitialized);
        match &self.failure {
            Some(msg) => Err(CoreError::Initialization(msg.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_only_creates_accounts_for_demo_integrations() {
        let services = MemoryServices::new();
        let summary = services.sync_all_integrations().unwrap();
        assert_eq!(summary.accounts, 0);

        services.add_integration("demo", DEMO_PROVIDER);
        services.sync_all_integrations().unwrap();
        services.sync_all_integrations().unwrap();
        assert_eq!(services.accounts().len(), 2);
    }

    #[test]
    fn injected_failures_surface_as_errors() {
        let services = MemoryServices::new();
        services.fail_writes("disk full");
        let err = services.execute_write_query("budget").unwrap_err();
        assert!(matches!(err, CoreError::Repository(ref m) if m == "disk full"));
        assert!(services.writes().is_empty());
    }

    #[test]
    fn journal_records_in_order() {
        let journal = Journal::new();
        let store = InMemoryDemoModeStore::new(false, journal.clone());
        let init = RecordingInitializer::new(journal.clone());
        store.set_demo_mode(true).unwrap();
        init.ensure_initialized().unwrap();
        assert_eq!(
            journal.events(),
            vec![Event::SetDemoMode(true), Event::EnsureInitialized]
        );
        assert!(store.get());
    }
}
