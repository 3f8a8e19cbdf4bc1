//! sqlite-adapter: SQLite implementation of the Treeline service ports.
//!
//! Purpose
//! - Back the integration, account, sync, and write-query ports with a single
//!   file-based database (the real `treeline.db` or the disposable demo db).
//! - Provide the schema hook run right after a fresh demo database is selected.
//! - Ship the `demo` integration provider that produces sample data.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Databases run in WAL journal mode, so a `<file>-wal` sits next to each
//!   database while a connection is open.
//! - Dates are stored as `YYYY-MM-DD` text, timestamps as seconds since UNIX_EPOCH.

pub mod demo;
pub mod sync;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use domain::{
    Account, AccountService, CoreError, DbService, Integration, IntegrationProvider,
    IntegrationService, IntegrationSettings, ProviderSnapshot, SchemaInitializer,
};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

pub use demo::DemoProvider;
pub use sync::SqliteSyncService;

/// SQLite-backed store for one Treeline database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path`. The schema is created by
    /// [`SchemaInitializer::ensure_initialized`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    CoreError::Repository(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
        }
        let conn = Connection::open(&path).map_err(map_sqerr)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(map_sqerr)?;
        debug!(path = %path.display(), journal_mode = %mode, "opened database");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    /// Upsert a provider snapshot. Accounts are matched on the provider's
    /// external id; transactions already seen are ignored.
    /// Returns `(accounts, new transactions)`.
    pub fn apply_snapshot(
        &self,
        provider: &str,
        snapshot: &ProviderSnapshot,
    ) -> Result<(usize, usize), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        let now = Utc::now().timestamp();

        let mut ids: BTreeMap<&str, String> = BTreeMap::new();
        for account in &snapshot.accounts {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT account_id FROM account_external_ids WHERE provider = ?1 AND external_id = ?2",
                    params![provider, account.external_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(map_sqerr)?;
            let id = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE accounts SET name = ?1, institution = ?2, currency = ?3, balance_cents = ?4 WHERE id = ?5",
                        params![
                            account.name,
                            account.institution,
                            account.currency,
                            account.balance_cents,
                            id
                        ],
                    )
                    .map_err(map_sqerr)?;
                    id
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    tx.execute(
                        "INSERT INTO accounts(id, name, institution, currency, balance_cents, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            id,
                            account.name,
                            account.institution,
                            account.currency,
                            account.balance_cents,
                            now
                        ],
                    )
                    .map_err(map_sqerr)?;
                    tx.execute(
                        "INSERT INTO account_external_ids(account_id, provider, external_id) VALUES (?1, ?2, ?3)",
                        params![id, provider, account.external_id],
                    )
                    .map_err(map_sqerr)?;
                    id
                }
            };
            ids.insert(account.external_id.as_str(), id);
        }

        let mut inserted = 0;
        for txn in &snapshot.transactions {
            let Some(account_id) = ids.get(txn.account_external_id.as_str()) else {
                debug!(external_id = %txn.external_id, "skipping transaction for unknown account");
                continue;
            };
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO transactions(id, account_id, provider, external_id, posted_date, amount_cents, description) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        account_id,
                        provider,
                        txn.external_id,
                        txn.posted,
                        txn.amount_cents,
                        txn.description,
                    ],
                )
                .map_err(map_sqerr)?;
        }
        tx.commit().map_err(map_sqerr)?;
        Ok((snapshot.accounts.len(), inserted))
    }

    /// Number of rows in `table`. Only for the fixed table names of this schema.
    pub fn count_rows(&self, table: &str) -> Result<u64, CoreError> {
        if !TABLES.contains(&table) {
            return Err(CoreError::Repository(format!("unknown table: {table}")));
        }
        let conn = self.lock()?;
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|n| n as u64)
        .map_err(map_sqerr)
    }
}

/// Tables created by [`init_schema`].
pub const TABLES: [&str; 6] = [
    "integrations",
    "accounts",
    "account_external_ids",
    "transactions",
    "balance_snapshots",
    "budget_categories",
];

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS integrations (
            name TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            settings TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            institution TEXT,
            currency TEXT NOT NULL,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS account_external_ids (
            account_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            external_id TEXT NOT NULL,
            PRIMARY KEY (provider, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_account_external_ids_account ON account_external_ids(account_id);
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            external_id TEXT NOT NULL,
            posted_date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            description TEXT NOT NULL,
            UNIQUE (provider, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id, posted_date);
        CREATE TABLE IF NOT EXISTS balance_snapshots (
            account_id TEXT NOT NULL,
            snapshot_date TEXT NOT NULL,
            balance_cents INTEGER NOT NULL,
            source TEXT NOT NULL,
            PRIMARY KEY (account_id, snapshot_date)
        );
        CREATE TABLE IF NOT EXISTS budget_categories (
            month TEXT NOT NULL,
            category TEXT NOT NULL,
            kind TEXT NOT NULL,
            expected_cents INTEGER NOT NULL,
            PRIMARY KEY (month, category)
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

impl SchemaInitializer for SqliteStore {
    fn ensure_initialized(&self) -> Result<(), CoreError> {
        let conn = self.lock()?;
        init_schema(&conn).map_err(|e| CoreError::Initialization(e.to_string()))
    }
}

impl DbService for SqliteStore {
    fn execute_write_query(&self, sql: &str) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute_batch(sql).map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        debug!(bytes = sql.len(), "executed write query");
        Ok(())
    }
}

impl IntegrationService for SqliteStore {
    fn get_integrations(&self) -> Result<Vec<Integration>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name, provider, settings FROM integrations ORDER BY created_at, name")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let settings: String = row.get(2).map_err(map_sqerr)?;
            let settings: IntegrationSettings = serde_json::from_str(&settings)
                .map_err(|e| CoreError::Repository(format!("bad integration settings: {e}")))?;
            out.push(Integration {
                name: row.get(0).map_err(map_sqerr)?,
                provider: row.get(1).map_err(map_sqerr)?,
                settings,
            });
        }
        Ok(out)
    }

    fn create_integration(
        &self,
        provider: &dyn IntegrationProvider,
        name: &str,
        settings: IntegrationSettings,
    ) -> Result<(), CoreError> {
        let settings = serde_json::to_string(&settings)
            .map_err(|e| CoreError::Repository(format!("bad integration settings: {e}")))?;
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO integrations(name, provider, settings, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, provider.name(), settings, Utc::now().timestamp()],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::Repository(format!("integration '{name}' already exists")))
            }
            Err(e) => Err(map_sqerr(e)),
        }
    }
}

impl AccountService for SqliteStore {
    fn get_accounts(&self) -> Result<Vec<Account>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, institution, currency, balance_cents FROM accounts ORDER BY name, id",
            )
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            accounts.push(Account {
                id: row.get(0).map_err(map_sqerr)?,
                name: row.get(1).map_err(map_sqerr)?,
                institution: row.get(2).map_err(map_sqerr)?,
                currency: row.get(3).map_err(map_sqerr)?,
                balance_cents: row.get(4).map_err(map_sqerr)?,
                external_ids: BTreeMap::new(),
            });
        }

        let mut stmt = conn
            .prepare("SELECT account_id, provider, external_id FROM account_external_ids")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let account_id: String = row.get(0).map_err(map_sqerr)?;
            if let Some(account) = accounts.iter_mut().find(|a| a.id == account_id) {
                account
                    .external_ids
                    .insert(row.get(1).map_err(map_sqerr)?, row.get(2).map_err(map_sqerr)?);
            }
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use domain::{ProviderAccount, ProviderTransaction, DEMO_PROVIDER};

    fn tmp_db() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("t.db")).unwrap();
        store.ensure_initialized().unwrap();
        (store, dir)
    }

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn snapshot() -> ProviderSnapshot {
        ProviderSnapshot {
            accounts: vec![ProviderAccount {
                external_id: "ext-1".into(),
                name: "Checking".into(),
                institution: Some("Bank".into()),
                currency: "USD".into(),
                balance_cents: 1_000,
            }],
            transactions: vec![
                ProviderTransaction {
                    external_id: "t-1".into(),
                    account_external_id: "ext-1".into(),
                    posted: anchor(),
                    amount_cents: -250,
                    description: "Coffee".into(),
                },
                ProviderTransaction {
                    external_id: "t-orphan".into(),
                    account_external_id: "missing".into(),
                    posted: anchor(),
                    amount_cents: -1,
                    description: "Orphan".into(),
                },
            ],
        }
    }

    #[test]
    fn ensure_initialized_is_idempotent() {
        let (store, _dir) = tmp_db();
        store.ensure_initialized().unwrap();
        for table in TABLES {
            assert_eq!(store.count_rows(table).unwrap(), 0);
        }
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("demo.db");
        let store = SqliteStore::open(&path).unwrap();
        store.ensure_initialized().unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn integration_roundtrip_keeps_settings() {
        let (store, _dir) = tmp_db();
        let provider = DemoProvider::new(anchor());
        let mut settings = IntegrationSettings::new();
        settings.insert("region".into(), "us".into());
        store.create_integration(&provider, "demo", settings.clone()).unwrap();

        let got = store.get_integrations().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "demo");
        assert_eq!(got[0].provider, DEMO_PROVIDER);
        assert_eq!(got[0].settings, settings);
    }

    #[test]
    fn duplicate_integration_is_rejected() {
        let (store, _dir) = tmp_db();
        let provider = DemoProvider::new(anchor());
        store.create_integration(&provider, "demo", IntegrationSettings::new()).unwrap();
        let err = store
            .create_integration(&provider, "demo", IntegrationSettings::new())
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn apply_snapshot_upserts_accounts_and_dedupes_transactions() {
        let (store, _dir) = tmp_db();
        assert_eq!(store.apply_snapshot("bank", &snapshot()).unwrap(), (1, 1));

        let mut again = snapshot();
        again.accounts[0].balance_cents = 750;
        assert_eq!(store.apply_snapshot("bank", &again).unwrap(), (1, 0));

        let accounts = store.get_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].balance_cents, 750);
        assert_eq!(accounts[0].external_id("bank"), Some("ext-1"));
        assert_eq!(store.count_rows("transactions").unwrap(), 1);
    }

    #[test]
    fn failed_write_query_rolls_back() {
        let (store, _dir) = tmp_db();
        let err = store
            .execute_write_query(
                "INSERT INTO budget_categories VALUES ('2024-03', 'Food', 'expense', 100); \
                 INSERT INTO no_such_table VALUES (1);",
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Repository(_)));
        assert_eq!(store.count_rows("budget_categories").unwrap(), 0);
    }

    #[test]
    fn count_rows_rejects_unknown_tables() {
        let (store, _dir) = tmp_db();
        assert!(store.count_rows("sqlite_master; DROP TABLE accounts").is_err());
    }

    #[test]
    fn writes_go_through_write_ahead_log() {
        let (store, dir) = tmp_db();
        let mode: String = store
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        store
            .execute_write_query(
                "INSERT INTO budget_categories VALUES ('2024-03', 'Food', 'expense', 100);",
            )
            .unwrap();
        assert!(dir.path().join("t.db-wal").exists());
    }

    #[test]
    fn uninitialized_database_fails_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("raw.db")).unwrap();
        assert!(store.get_accounts().is_err());
    }
}
