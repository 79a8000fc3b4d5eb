//! Remote document collection gateway.
//!
//! The gateway is the authoritative store when reachable. Whether it is
//! reachable is decided once, at construction, and exposed through
//! [`RemoteGateway::is_available`].

mod memory;
mod rest;
mod wire;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::RemoteConfig;

/// Equality-filtered query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
  pub collection: String,
  pub filters: Vec<(String, Value)>,
  pub order_by: Option<String>,
  pub limit: Option<usize>,
}

impl Query {
  pub fn collection(name: impl Into<String>) -> Self {
    Self {
      collection: name.into(),
      filters: Vec::new(),
      order_by: None,
      limit: None,
    }
  }

  /// Add an equality predicate on `field`.
  pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.filters.push((field.into(), value.into()));
    self
  }

  /// Filter on the tenant field when a tenant is given.
  pub fn tenant(self, tenant: Option<&str>) -> Self {
    match tenant {
      Some(t) => self.where_eq(crate::cache::TENANT_FIELD, t),
      None => self,
    }
  }

  pub fn order_by(mut self, field: impl Into<String>) -> Self {
    self.order_by = Some(field.into());
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  /// Whether a document (as a JSON object) satisfies every filter.
  pub fn matches(&self, document: &Map<String, Value>) -> bool {
    self
      .filters
      .iter()
      .all(|(field, wanted)| document.get(field) == Some(wanted))
  }
}

/// Operations the sync layer needs from a remote document store.
///
/// Documents travel as JSON objects and always carry their identifier in the
/// `id` field when returned.
pub trait RemoteGateway: Send + Sync {
  /// Whether remote calls can be attempted at all.
  fn is_available(&self) -> bool;

  /// A fresh document identifier.
  fn mint_id(&self) -> String {
    mint_document_id()
  }

  /// Run a filtered fetch-all.
  fn run_query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Vec<Value>>>;

  /// Get a single document, `None` when it does not exist.
  fn get_document<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> BoxFuture<'a, Result<Option<Value>>>;

  /// Shallow-merge `fields` into the document `id`, creating it if needed.
  ///
  /// The store writes its own clock into `stamp_field`. Returns the merged
  /// document.
  fn merge_upsert<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    fields: Map<String, Value>,
    stamp_field: &'a str,
  ) -> BoxFuture<'a, Result<Value>>;

  fn delete_document<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>>;

  /// Push channel of changed collection names, if the store has one.
  ///
  /// Watches fall back to polling when this is `None`.
  fn changes(&self) -> Option<broadcast::Receiver<String>> {
    None
  }
}

/// Gateway used when remote configuration is incomplete.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

impl RemoteGateway for Offline {
  fn is_available(&self) -> bool {
    false
  }

  fn run_query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Vec<Value>>> {
    Box::pin(async move { Err(eyre!("Remote unavailable: cannot query {}", query.collection)) })
  }

  fn get_document<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> BoxFuture<'a, Result<Option<Value>>> {
    Box::pin(async move { Err(eyre!("Remote unavailable: cannot get {}/{}", collection, id)) })
  }

  fn merge_upsert<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    _fields: Map<String, Value>,
    _stamp_field: &'a str,
  ) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move { Err(eyre!("Remote unavailable: cannot write {}/{}", collection, id)) })
  }

  fn delete_document<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move { Err(eyre!("Remote unavailable: cannot delete {}/{}", collection, id)) })
  }
}

/// Build the gateway described by `config`.
///
/// Incomplete configuration yields [`Offline`] and the process runs
/// cache-only for its whole lifetime.
pub fn connect(config: &RemoteConfig) -> Result<Arc<dyn RemoteGateway>> {
  if !config.is_complete() {
    tracing::info!("remote configuration incomplete, running cache-only");
    return Ok(Arc::new(Offline));
  }

  Ok(Arc::new(RestGateway::new(config)?))
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 20 hex characters derived from the clock and a process counter.
pub fn mint_document_id() -> String {
  let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
  let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

  let mut hasher = Sha256::new();
  hasher.update(nanos.to_le_bytes());
  hasher.update(count.to_le_bytes());
  hasher.update(std::process::id().to_le_bytes());
  let digest = hex::encode(hasher.finalize());
  digest[..20].to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_minted_ids_are_distinct() {
    let a = mint_document_id();
    let b = mint_document_id();
    assert_eq!(a.len(), 20);
    assert_ne!(a, b);
  }

  #[test]
  fn test_query_matches_all_filters() {
    let query = Query::collection("pings")
      .where_eq("targetId", "u1")
      .where_eq("played", false);

    let hit = json!({"targetId": "u1", "played": false});
    let miss = json!({"targetId": "u1", "played": true});
    assert!(query.matches(hit.as_object().unwrap()));
    assert!(!query.matches(miss.as_object().unwrap()));
  }

  #[test]
  fn test_tenant_filter_only_when_given() {
    assert!(Query::collection("orders").tenant(None).filters.is_empty());
    assert_eq!(
      Query::collection("orders").tenant(Some("A")).filters,
      vec![("instanceId".to_string(), json!("A"))]
    );
  }

  #[tokio::test]
  async fn test_offline_gateway_refuses_everything() {
    let offline = Offline;
    assert!(!offline.is_available());
    assert!(offline.run_query(&Query::collection("users")).await.is_err());
    assert!(offline.delete_document("users", "1").await.is_err());
  }
}
