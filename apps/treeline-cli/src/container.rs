//! Service container over the SQLite adapter.
//!
//! The database file is chosen from the demo-mode flag when the container is
//! first built and stays bound until `reset()`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use domain::{Container, ContainerFactory, CoreError, DemoModeStore, SchemaInitializer};
use sqlite_adapter::{DemoProvider, SqliteStore, SqliteSyncService};
use tracing::debug;

use crate::config::Config;

#[derive(Clone)]
struct Bound {
    store: Arc<SqliteStore>,
    container: Container,
}

/// Lazily opens the active database and wires the SQLite services around it.
pub struct SqliteContainerFactory {
    real_db: PathBuf,
    demo_db: PathBuf,
    mode: Arc<dyn DemoModeStore>,
    demo: Arc<DemoProvider>,
    bound: Mutex<Option<Bound>>,
}

impl SqliteContainerFactory {
    pub fn new(config: &Config, mode: Arc<dyn DemoModeStore>, demo: DemoProvider) -> Self {
        Self {
            real_db: config.real_db_path(),
            demo_db: config.demo_db_paths().db,
            mode,
            demo: Arc::new(demo),
            bound: Mutex::new(None),
        }
    }

    /// Database file the flag currently selects.
    pub fn active_db_path(&self) -> Result<PathBuf, CoreError> {
        Ok(if self.mode.is_demo_mode()? {
            self.demo_db.clone()
        } else {
            self.real_db.clone()
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Bound>> {
        self.bound.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn bound(&self) -> Result<Bound, CoreError> {
        let mut guard = self.lock();
        if let Some(bound) = guard.as_ref() {
            return Ok(bound.clone());
        }

        let path = self.active_db_path()?;
        debug!(path = %path.display(), "binding service container");
        let store = Arc::new(SqliteStore::open(&path)?);
        let sync = SqliteSyncService::new(store.clone(), vec![self.demo.clone()]);
        let container = Container::new(
            store.clone(),
            Arc::new(sync),
            store.clone(),
            store.clone(),
            self.demo.clone(),
        )
        .with_provider(self.demo.clone());

        let bound = Bound { store, container };
        *guard = Some(bound.clone());
        Ok(bound)
    }
}

impl ContainerFactory for SqliteContainerFactory {
    fn container(&self) -> Result<Container, CoreError> {
        Ok(self.bound()?.container)
    }

    fn reset(&self) {
        *self.lock() = None;
    }
}

impl SchemaInitializer for SqliteContainerFactory {
    fn ensure_initialized(&self) -> Result<(), CoreError> {
        self.bound()?.store.ensure_initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FileDemoModeStore;

    fn factory(dir: &std::path::Path) -> (SqliteContainerFactory, Arc<FileDemoModeStore>) {
        let config = Config::in_dir(dir);
        let mode = Arc::new(FileDemoModeStore::new(config.settings_path()));
        (SqliteContainerFactory::new(&config, mode.clone(), DemoProvider::today()), mode)
    }

    #[test]
    fn binds_to_database_selected_by_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, mode) = factory(dir.path());
        assert_eq!(factory.active_db_path().unwrap(), dir.path().join("treeline.db"));

        mode.set_demo_mode(true).unwrap();
        assert_eq!(factory.active_db_path().unwrap(), dir.path().join("demo.db"));
    }

    #[test]
    fn container_is_cached_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, mode) = factory(dir.path());
        factory.ensure_initialized().unwrap();
        assert!(dir.path().join("treeline.db").exists());

        // Still bound to the real database after the flag flips.
        mode.set_demo_mode(true).unwrap();
        factory.ensure_initialized().unwrap();
        assert!(!dir.path().join("demo.db").exists());

        factory.reset();
        factory.ensure_initialized().unwrap();
        assert!(dir.path().join("demo.db").exists());
    }

    #[test]
    fn container_exposes_demo_provider() {
        let dir = tempfile::tempdir().unwrap();
        let (factory, _mode) = factory(dir.path());
        let container = factory.container().unwrap();
        assert!(container.integration_provider("demo").is_some());
        assert!(container.integration_provider("simplefin").is_none());
    }
}
