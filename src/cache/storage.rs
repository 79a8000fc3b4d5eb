//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Prefix applied to every logical cache key.
pub const KEY_PREFIX: &str = "opsdesk_";

/// Physical key under which a logical cache key is stored.
pub fn namespaced(key: &str) -> String {
  format!("{}{}", KEY_PREFIX, key)
}

/// Trait for durable string-keyed cache backends.
///
/// Values are opaque strings (serialized JSON arrays). Backends do not
/// validate them; callers must tolerate unparseable content.
pub trait CacheStorage: Send + Sync {
  /// Get the raw value stored under a logical key.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Replace the raw value stored under a logical key.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Drop a logical key entirely.
  fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage. Contents are lost when it is dropped.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(&namespaced(key)).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(namespaced(key), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.remove(&namespaced(key));
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the cache database at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("opsdesk").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One JSON array per namespaced key
CREATE TABLE IF NOT EXISTS local_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM local_cache WHERE key = ?",
        params![namespaced(key)],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO local_cache (key, value, written_at)
         VALUES (?, ?, datetime('now'))",
        params![namespaced(key), value],
      )
      .map_err(|e| eyre!("Failed to write cache entry {}: {}", key, e))?;

    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM local_cache WHERE key = ?",
        params![namespaced(key)],
      )
      .map_err(|e| eyre!("Failed to remove cache entry {}: {}", key, e))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_namespaced_key() {
    assert_eq!(namespaced("users"), "opsdesk_users");
  }

  #[test]
  fn test_sqlite_set_get_remove() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    assert_eq!(storage.get("orders").unwrap(), None);

    storage.set("orders", "[]").unwrap();
    storage.set("orders", r#"[{"id":"1"}]"#).unwrap();
    assert_eq!(storage.get("orders").unwrap().as_deref(), Some(r#"[{"id":"1"}]"#));

    storage.remove("orders").unwrap();
    assert_eq!(storage.get("orders").unwrap(), None);
  }

  #[test]
  fn test_sqlite_stores_under_prefixed_key() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set("firms", "[]").unwrap();

    let conn = storage.conn.lock().unwrap();
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM local_cache WHERE key = 'opsdesk_firms'",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn test_sqlite_entries_survive_reopen() {
    let dir = std::env::temp_dir().join(format!(
      "opsdesk-cache-{}-{}",
      std::process::id(),
      chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    let path = dir.join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(Some(&path)).unwrap();
      storage.set("customers", r#"[{"id":"c1"}]"#).unwrap();
    }
    assert!(path.exists());

    let reopened = SqliteStorage::open(Some(&path)).unwrap();
    assert_eq!(
      reopened.get("customers").unwrap().as_deref(),
      Some(r#"[{"id":"c1"}]"#)
    );
    assert_eq!(reopened.get("firms").unwrap(), None);

    drop(reopened);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn test_sqlite_accepts_unparseable_values() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.set("links", "{not json").unwrap();
    assert_eq!(storage.get("links").unwrap().as_deref(), Some("{not json"));
  }

  #[test]
  fn test_memory_storage_keys_are_independent() {
    let storage = MemoryStorage::new();
    storage.set("users", "[1]").unwrap();
    storage.set("groups", "[2]").unwrap();
    assert_eq!(storage.get("users").unwrap().as_deref(), Some("[1]"));
    assert_eq!(storage.get("groups").unwrap().as_deref(), Some("[2]"));
  }
}
