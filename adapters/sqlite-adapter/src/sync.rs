//! Sync of every stored integration into the store.

use std::sync::Arc;

use domain::{CoreError, IntegrationProvider, IntegrationService, SyncService, SyncSummary};
use tracing::{info, warn};

use crate::SqliteStore;

/// Pulls each integration's provider snapshot into a [`SqliteStore`].
///
/// One failing integration does not stop the others; their errors are joined
/// into a single `CoreError::Provider` after the successful ones are stored.
pub struct SqliteSyncService {
    store: Arc<SqliteStore>,
    providers: Vec<Arc<dyn IntegrationProvider>>,
}

impl SqliteSyncService {
    pub fn new(store: Arc<SqliteStore>, providers: Vec<Arc<dyn IntegrationProvider>>) -> Self {
        Self { store, providers }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn IntegrationProvider>, CoreError> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| CoreError::Provider(format!("no provider registered for '{name}'")))
    }
}

impl SyncService for SqliteSyncService {
    fn sync_all_integrations(&self) -> Result<SyncSummary, CoreError> {
        let integrations = self.store.get_integrations()?;
        let mut summary = SyncSummary::default();
        let mut errors = Vec::new();

        for integration in &integrations {
            let result = self.provider(&integration.provider).and_then(|provider| {
                let snapshot = provider.fetch(&integration.settings)?;
                self.store.apply_snapshot(provider.name(), &snapshot)
            });
            match result {
                Ok((accounts, transactions)) => {
                    info!(
                        integration = %integration.name,
                        accounts,
                        transactions,
                        "synced integration"
                    );
                    summary.integrations += 1;
                    summary.accounts += accounts;
                    summary.transactions += transactions;
                }
                Err(e) => {
                    warn!(integration = %integration.name, error = %e, "sync failed");
                    errors.push(format!("{}: {}", integration.name, e));
                }
            }
        }

        if errors.is_empty() {
            Ok(summary)
        } else {
            Err(CoreError::Provider(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DemoProvider;
    use chrono::NaiveDate;
    use domain::{AccountService, IntegrationSettings, SchemaInitializer, DEMO_PROVIDER};

    struct Unreachable;

    impl IntegrationProvider for Unreachable {
        fn name(&self) -> &str {
            "simplefin"
        }

        fn fetch(
            &self,
            _settings: &IntegrationSettings,
        ) -> Result<domain::ProviderSnapshot, CoreError> {
            Err(CoreError::Provider("connection refused".into()))
        }
    }

    fn setup() -> (Arc<SqliteStore>, Arc<DemoProvider>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("sync.db")).unwrap());
        store.ensure_initialized().unwrap();
        let demo = Arc::new(DemoProvider::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
        (store, demo, dir)
    }

    #[test]
    fn syncs_demo_integration() {
        let (store, demo, _dir) = setup();
        store
            .create_integration(demo.as_ref(), "demo", IntegrationSettings::new())
            .unwrap();
        let sync = SqliteSyncService::new(store.clone(), vec![demo.clone()]);

        let summary = sync.sync_all_integrations().unwrap();
        assert_eq!(summary.integrations, 1);
        assert_eq!(summary.accounts, demo.snapshot().accounts.len());
        assert_eq!(summary.transactions, demo.snapshot().transactions.len());

        let again = sync.sync_all_integrations().unwrap();
        assert_eq!(again.transactions, 0);
        let accounts = store.get_accounts().unwrap();
        assert!(accounts.iter().all(|a| a.external_id(DEMO_PROVIDER).is_some()));
    }

    #[test]
    fn no_integrations_is_an_empty_sync() {
        let (store, demo, _dir) = setup();
        let sync = SqliteSyncService::new(store, vec![demo]);
        assert_eq!(sync.sync_all_integrations().unwrap(), SyncSummary::default());
    }

    #[test]
    fn one_failing_integration_keeps_the_others() {
        let (store, demo, _dir) = setup();
        store
            .create_integration(demo.as_ref(), "demo", IntegrationSettings::new())
            .unwrap();
        store
            .create_integration(&Unreachable, "bank", IntegrationSettings::new())
            .unwrap();
        let sync = SqliteSyncService::new(store.clone(), vec![demo, Arc::new(Unreachable)]);

        let err = sync.sync_all_integrations().unwrap_err();
        assert!(err.to_string().contains("bank: provider error: connection refused"));
        assert!(!store.get_accounts().unwrap().is_empty());
    }

    #[test]
    fn missing_provider_is_reported() {
        let (store, demo, _dir) = setup();
        store
            .create_integration(&Unreachable, "bank", IntegrationSettings::new())
            .unwrap();
        let sync = SqliteSyncService::new(store, vec![demo]);
        let err = sync.sync_all_integrations().unwrap_err();
        assert!(err.to_string().contains("no provider registered for 'simplefin'"));
    }
}
