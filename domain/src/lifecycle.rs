//! Demo database file lifecycle.
//!
//! Activation always starts from an empty demo database, so the database file
//! and its write-ahead log are removed before the schema is recreated.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::DemoStorage;

/// File name of the demo database inside the treeline directory.
pub const DEMO_DB_FILE: &str = "demo.db";

/// Location of the demo database and its write-ahead-log sibling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoDbPaths {
    pub db: PathBuf,
    pub wal: PathBuf,
}

impl DemoDbPaths {
    /// Resolve the demo database inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::for_db(dir.as_ref().join(DEMO_DB_FILE))
    }

    /// Derive the WAL path from a database path (`<db>-wal`, as SQLite names it).
    pub fn for_db<P: Into<PathBuf>>(db: P) -> Self {
        let db = db.into();
        let mut wal = db.clone().into_os_string();
        wal.push("-wal");
        Self {
            db,
            wal: PathBuf::from(wal),
        }
    }
}

/// File-backed demo database.
#[derive(Clone, Debug)]
pub struct DemoDatabase {
    paths: DemoDbPaths,
}

impl DemoDatabase {
    pub fn new(paths: DemoDbPaths) -> Self {
        Self { paths }
    }
}

impl DemoStorage for DemoDatabase {
    fn delete(&self) -> Vec<String> {
        // A WAL left behind without its database would be replayed into the
        // fresh file, so both are removed independently.
        [&self.paths.db, &self.paths.wal]
            .into_iter()
            .filter_map(|path| remove_if_present(path).err())
            .collect()
    }
}

fn remove_if_present(path: &Path) -> Result<(), String> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed demo database file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove demo database file");
            Err(format!("could not remove {}: {}", path.display(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_sqlite_naming() {
        let paths = DemoDbPaths::in_dir("/tmp/treeline");
        assert_eq!(paths.db, PathBuf::from("/tmp/treeline/demo.db"));
        assert_eq!(paths.wal, PathBuf::from("/tmp/treeline/demo.db-wal"));
    }

    #[test]
    fn delete_removes_db_and_wal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoDbPaths::in_dir(dir.path());
        fs::write(&paths.db, b"db").unwrap();
        fs::write(&paths.wal, b"wal").unwrap();

        let warnings = DemoDatabase::new(paths.clone()).delete();
        assert!(warnings.is_empty());
        assert!(!paths.db.exists());
        assert!(!paths.wal.exists());
    }

    #[test]
    fn delete_is_noop_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let db = DemoDatabase::new(DemoDbPaths::in_dir(dir.path()));
        assert!(db.delete().is_empty());
        assert!(db.delete().is_empty());
    }

    #[test]
    fn delete_removes_stray_wal_without_db() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoDbPaths::in_dir(dir.path());
        fs::write(&paths.wal, b"wal").unwrap();

        assert!(DemoDatabase::new(paths.clone()).delete().is_empty());
        assert!(!paths.wal.exists());
    }

    #[test]
    fn delete_reports_failure_and_still_attempts_wal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DemoDbPaths::in_dir(dir.path());
        // A directory in place of the db file cannot be removed with remove_file.
        fs::create_dir(&paths.db).unwrap();
        fs::write(&paths.wal, b"wal").unwrap();

        let warnings = DemoDatabase::new(paths.clone()).delete();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("demo.db"));
        assert!(!paths.wal.exists());
    }
}
