//! Key-value persistence for the settings blob.
//!
//! [`SettingsStore`] is the port the settings service talks to; [`SqliteStore`] backs it
//! on disk and [`MemoryStore`] stands in for it in tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::StorageOptions;

mod schema;

pub trait SettingsStore: Send {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl SqliteStore {
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }
}

impl SettingsStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .with_context(|| format!("reading key '{key}'"))
        })
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .with_context(|| format!("writing key '{key}'"))?;
            Ok(())
        })
    }
}

/// Process-local store; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::default();
        store.entries.lock().insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub fn init(options: &StorageOptions) -> Result<SqliteStore> {
    let db_path = &options.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, options)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "settings store ready");
    Ok(SqliteStore {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(options.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_store() -> Result<(TempDir, SqliteStore)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let options = StorageOptions {
            database_path: temp.path().join("data/settings.db"),
            ..StorageOptions::default()
        };
        let store = init(&options)?;
        Ok((temp, store))
    }

    #[test]
    fn missing_key_reads_as_none() -> Result<()> {
        let (_temp, store) = init_store()?;
        assert_eq!(store.read("absent")?, None);
        Ok(())
    }

    #[test]
    fn write_overwrites_existing_value() -> Result<()> {
        let (_temp, store) = init_store()?;
        store.write("kintai-settings", "{\"a\":1}")?;
        store.write("kintai-settings", "{\"a\":2}")?;
        assert_eq!(store.read("kintai-settings")?.as_deref(), Some("{\"a\":2}"));
        let rows: i64 = store.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
                .context("counting rows")
        })?;
        assert_eq!(rows, 1);
        Ok(())
    }

    #[test]
    fn values_survive_reopening() -> Result<()> {
        let (temp, store) = init_store()?;
        store.write("k", "v")?;
        drop(store);
        let options = StorageOptions {
            database_path: temp.path().join("data/settings.db"),
            ..StorageOptions::default()
        };
        let reopened = init(&options)?;
        assert_eq!(reopened.read("k")?.as_deref(), Some("v"));
        Ok(())
    }

    #[test]
    fn memory_store_clones_share_entries() -> Result<()> {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.write("k", "v")?;
        assert_eq!(handle.get("k").as_deref(), Some("v"));
        Ok(())
    }
}
