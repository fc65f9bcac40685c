//! Key-value persistence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::Result;

/// A set of keys and their JSON values.
pub type Record = serde_json::Map<String, Value>;

/// Minimal `get(keys)` / `set(record)` store. Keys absent from the store are
/// absent from the returned record.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, keys: &[&str]) -> Result<Record>;
    fn set(&self, record: Record) -> Result<()>;
}

/// Volatile store for tests and `--memory` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Record> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, record: Record) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.extend(record);
        Ok(())
    }
}

/// SQLite-backed store: one row per key, values stored as JSON text.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, keys: &[&str]) -> Result<Record> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;

        let mut record = Record::new();
        for key in keys {
            let raw: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
            if let Some(raw) = raw {
                record.insert(key.to_string(), serde_json::from_str(&raw)?);
            }
        }
        Ok(record)
    }

    fn set(&self, record: Record) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let now = chrono::Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in &record {
                stmt.execute(params![key, serde_json::to_string(value)?, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
