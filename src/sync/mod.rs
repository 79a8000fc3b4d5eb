//! Synchronization layer combining the remote gateway with the local cache.
//!
//! The remote store is authoritative whenever it is reachable; the local
//! cache is the durable fallback. Remote failures degrade to cache-only
//! behaviour and are only surfaced for bypass-cache reads.

mod ping;
mod watch;

pub use ping::ping_id;
pub use watch::Subscription;

use chrono::Utc;
use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{decode_record, CacheStorage, LocalCache, Record, ID_FIELD, UPDATED_AT_FIELD};
use crate::config::SyncConfig;
use crate::remote::{Query, RemoteGateway};

/// Options for [`SyncLayer::fetch`].
#[derive(Debug)]
pub struct FetchOptions<'a, T> {
  /// Only return records visible to this tenant
  pub tenant: Option<&'a str>,
  /// Returned (not persisted) when the cache is empty
  pub seed: &'a [T],
  /// Never fall back to the cache; surface remote failures instead
  pub bypass_cache: bool,
}

impl<T> Default for FetchOptions<'_, T> {
  fn default() -> Self {
    Self {
      tenant: None,
      seed: &[],
      bypass_cache: false,
    }
  }
}

impl<'a, T> FetchOptions<'a, T> {
  pub fn tenant(tenant: Option<&'a str>) -> Self {
    Self {
      tenant,
      ..Self::default()
    }
  }
}

/// Shortest poll interval or remote timeout a sync layer accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Collection-level CRUD and live subscriptions over a cache and a remote.
pub struct SyncLayer<S: CacheStorage> {
  cache: LocalCache<S>,
  remote: Arc<dyn RemoteGateway>,
  poll_interval: Duration,
  remote_timeout: Duration,
}

impl<S: CacheStorage> SyncLayer<S> {
  /// Create a sync layer over the given storage and gateway.
  pub fn new(storage: S, remote: Arc<dyn RemoteGateway>) -> Self {
    let defaults = SyncConfig::default();
    Self {
      cache: LocalCache::new(storage),
      remote,
      poll_interval: defaults.poll_interval(),
      remote_timeout: defaults.remote_timeout(),
    }
  }

  /// Apply intervals from configuration.
  pub fn with_config(self, config: &SyncConfig) -> Self {
    self
      .with_poll_interval(config.poll_interval())
      .with_remote_timeout(config.remote_timeout())
  }

  /// How often watches re-query a gateway without push notifications.
  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval.max(MIN_INTERVAL);
    self
  }

  /// Upper bound on any single remote call.
  pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
    self.remote_timeout = remote_timeout.max(MIN_INTERVAL);
    self
  }

  pub fn remote_available(&self) -> bool {
    self.remote.is_available()
  }

  pub fn cache(&self) -> &LocalCache<S> {
    &self.cache
  }

  /// Run a remote call under the configured timeout.
  async fn bounded<T>(
    &self,
    op: &str,
    collection: &str,
    call: impl Future<Output = Result<T>>,
  ) -> Result<T> {
    match tokio::time::timeout(self.remote_timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(eyre!(
        "Remote {} on {} timed out after {:?}",
        op,
        collection,
        self.remote_timeout
      )),
    }
  }

  /// Read every record of a collection.
  ///
  /// 1. Remote reachable: query it, replace the cache entry with the result
  ///    (even when empty) and return it
  /// 2. Remote failed or unreachable: serve the cache, filtered by tenant,
  ///    or the seed records when the cache is empty
  ///
  /// With `bypass_cache` step 2 is skipped: a remote failure is returned as
  /// an error and an unreachable remote yields an empty list.
  pub async fn fetch<T: Record>(
    &self,
    collection: &str,
    key: &str,
    options: FetchOptions<'_, T>,
  ) -> Result<Vec<T>> {
    if self.remote.is_available() {
      let query = Query::collection(collection).tenant(options.tenant);
      match self
        .bounded("fetch", collection, self.remote.run_query(&query))
        .await
      {
        Ok(documents) => {
          // The cache mirrors the documents as returned, whatever their shape
          if let Err(e) = self.cache.replace(key, &documents) {
            warn!(collection, key, error = %e, "failed to refresh cache after fetch");
          }
          return Ok(decode_records(collection, documents));
        }
        Err(e) if options.bypass_cache => {
          return Err(e).wrap_err_with(|| format!("Failed to fetch {}", collection));
        }
        Err(e) => {
          warn!(collection, error = %e, "remote fetch failed, serving cache");
        }
      }
    } else if options.bypass_cache {
      debug!(collection, "remote unavailable and cache bypassed");
      return Ok(Vec::new());
    }

    let cached: Vec<T> = self.cache.load(key);
    if cached.is_empty() && !options.seed.is_empty() {
      return Ok(options.seed.to_vec());
    }

    Ok(
      cached
        .into_iter()
        .filter(|record| record.visible_to(options.tenant))
        .collect(),
    )
  }

  /// Write one record.
  ///
  /// The remote write is a shallow merge stamped with the store's clock; its
  /// id and stamp are adopted into the returned record. A failed remote
  /// write is logged and the cache write still happens. In the cache an
  /// update replaces the element with the same id, while an insert is
  /// skipped when that id is already present.
  pub async fn save<T: Record>(
    &self,
    collection: &str,
    key: &str,
    mut record: T,
    is_update: bool,
  ) -> Result<T> {
    let id = match record.id() {
      Some(id) => id.to_string(),
      None if self.remote.is_available() => self.remote.mint_id(),
      None => local_id(),
    };
    record.set_id(id.clone());

    if self.remote.is_available() {
      let written = match record_fields(&record) {
        Ok(fields) => {
          self
            .bounded(
              "save",
              collection,
              self
                .remote
                .merge_upsert(collection, &id, fields, UPDATED_AT_FIELD),
            )
            .await
        }
        Err(e) => Err(e),
      };

      match written {
        Ok(document) => {
          if let Some(at) = document.updated_at() {
            record.set_updated_at(at);
          }
          if let Some(remote_id) = document.id() {
            record.set_id(remote_id.to_string());
          }
        }
        Err(e) => {
          warn!(collection, id = %id, error = %e, "remote save failed, caching locally only")
        }
      }
    }

    self.cache.upsert(key, &record, is_update)?;
    Ok(record)
  }

  /// Delete one record by id, remotely and from the cache.
  ///
  /// The cache removal happens even when the remote delete fails.
  pub async fn remove(&self, collection: &str, key: &str, id: &str) -> Result<()> {
    if self.remote.is_available() {
      if let Err(e) = self
        .bounded("delete", collection, self.remote.delete_document(collection, id))
        .await
      {
        warn!(collection, id, error = %e, "remote delete failed");
      }
    }

    self.cache.remove_id(key, id)
  }
}

/// Identifier for a record written while the remote store is unreachable.
fn local_id() -> String {
  Utc::now().timestamp_millis().to_string()
}

/// Fields of a record as sent to the remote store, without the id.
fn record_fields<T: Record>(record: &T) -> Result<Map<String, Value>> {
  match serde_json::to_value(record) {
    Ok(Value::Object(mut fields)) => {
      fields.remove(ID_FIELD);
      Ok(fields)
    }
    Ok(other) => Err(eyre!("Record is not an object: {}", other)),
    Err(e) => Err(eyre!("Failed to serialize record: {}", e)),
  }
}

/// Deserialize remote documents, skipping ones that do not fit `T`.
fn decode_records<T: Record>(collection: &str, documents: Vec<Value>) -> Vec<T> {
  documents
    .into_iter()
    .filter_map(|document| match decode_record(document) {
      Ok(record) => Some(record),
      Err(e) => {
        debug!(collection, error = %e, "skipping undecodable remote document");
        None
      }
    })
    .collect()
}
