use std::path::PathBuf;

use tempfile::TempDir;

use crate::storage::database::Database;

/// Disk-backed throwaway database for tests and benches. The directory
/// (database file and write-ahead log included) is removed on drop.
pub struct TempDatabase {
    dir: TempDir,
    pub path: PathBuf,
    pub database: Option<Database>,
}

impl TempDatabase {
    pub fn new() -> Self {
        Self::with_prefix("gudang_test")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join(format!("{prefix}.db"));
        Self {
            dir,
            path,
            database: None,
        }
    }

    pub fn create(&mut self) -> &mut Database {
        let db = Database::create(&self.path).expect("create database");
        self.database = Some(db);
        self.database.as_mut().unwrap()
    }

    pub fn open(&mut self) -> &mut Database {
        let db = Database::open(&self.path).expect("open database");
        self.database = Some(db);
        self.database.as_mut().unwrap()
    }

    /// Drop the handle without removing the files, as a crashed or exited
    /// process would.
    pub fn close(&mut self) {
        self.database = None;
    }

    pub fn dir(&self) -> &TempDir {
        &self.dir
    }
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}
