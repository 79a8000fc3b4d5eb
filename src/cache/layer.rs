//! Typed list operations over a raw cache backend.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{decode_record, Record};

/// Local cache holding one JSON array of records per key.
///
/// Reads never fail: a missing, unreadable or corrupt entry is an empty list.
/// Writes replace the whole array, so concurrent writers to one key race and
/// the last one wins.
pub struct LocalCache<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> LocalCache<S> {
  /// Create a local cache over the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Raw array under `key`, or `None` when absent or not a JSON array.
  fn load_raw(&self, key: &str) -> Option<Vec<Value>> {
    let raw = match self.storage.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    match serde_json::from_str::<Vec<Value>>(&raw) {
      Ok(list) => Some(list),
      Err(e) => {
        debug!(key, error = %e, "ignoring unparseable cache entry");
        None
      }
    }
  }

  fn store_raw(&self, key: &str, list: &[Value]) -> Result<()> {
    let raw =
      serde_json::to_string(list).map_err(|e| eyre!("Failed to serialize cache entry: {}", e))?;
    self.storage.set(key, &raw)
  }

  /// All records under `key` that decode as `T`.
  pub fn load<T: Record>(&self, key: &str) -> Vec<T> {
    self
      .load_raw(key)
      .unwrap_or_default()
      .into_iter()
      .filter_map(|value| match decode_record(value) {
        Ok(record) => Some(record),
        Err(e) => {
          debug!(key, error = %e, "skipping undecodable cache element");
          None
        }
      })
      .collect()
  }

  /// Records under `key` visible to `tenant`.
  pub fn load_visible<T: Record>(&self, key: &str, tenant: Option<&str>) -> Vec<T> {
    self
      .load::<T>(key)
      .into_iter()
      .filter(|record| record.visible_to(tenant))
      .collect()
  }

  /// Replace the whole entry under `key`.
  pub fn replace<T: Record>(&self, key: &str, records: &[T]) -> Result<()> {
    let list = records
      .iter()
      .map(serde_json::to_value)
      .collect::<serde_json::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to serialize record: {}", e))?;
    self.store_raw(key, &list)
  }

  /// Write one record into the entry under `key`.
  ///
  /// With `is_update` the element sharing the record's id is replaced and
  /// nothing is inserted when none matches. Otherwise the record is
  /// prepended unless an element with the same id already exists.
  pub fn upsert<T: Record>(&self, key: &str, record: &T, is_update: bool) -> Result<()> {
    let value =
      serde_json::to_value(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;
    let id = record.id();
    let mut list = self.load_raw(key).unwrap_or_default();

    if is_update {
      for existing in list.iter_mut() {
        if id.is_some() && existing.id() == id {
          *existing = value.clone();
        }
      }
    } else if id.is_none() || !list.iter().any(|existing| existing.id() == id) {
      list.insert(0, value);
    }

    self.store_raw(key, &list)
  }

  /// Drop the element with `id` from the entry under `key`.
  ///
  /// Absent or unparseable entries are left untouched.
  pub fn remove_id(&self, key: &str, id: &str) -> Result<()> {
    let Some(mut list) = self.load_raw(key) else {
      return Ok(());
    };

    let before = list.len();
    list.retain(|existing| existing.id() != Some(id));
    if list.len() == before {
      return Ok(());
    }

    self.store_raw(key, &list)
  }
}

impl<S: CacheStorage> Clone for LocalCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
