pub mod models;

use crate::store::{ArtifactStore, StoreError};
use async_trait::async_trait;
use models::ArtifactRecord;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(db_path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(db_path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS artifacts (
                path TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Artifacts ──

    pub fn get_artifact(&self, path: &str) -> Result<Option<ArtifactRecord>, StoreError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT path, content, created_at FROM artifacts WHERE path = ?1",
                params![path],
                |row| {
                    Ok(ArtifactRecord {
                        path: row.get(0)?,
                        content: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn put_artifact(&self, path: &str, content: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // Single statement: the row is either fully replaced or untouched.
        conn.execute(
            "INSERT OR REPLACE INTO artifacts (path, content) VALUES (?1, ?2)",
            params![path, content],
        )?;
        Ok(())
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for Database {
    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.get_artifact(path)?.is_some())
    }

    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_artifact(path)?.map(|record| record.content))
    }

    async fn write(&self, path: &str, text: &str) -> Result<String, StoreError> {
        self.put_artifact(path, text)?;
        tracing::debug!(path, "Artifact written to database");
        Ok(path.to_string())
    }
}
