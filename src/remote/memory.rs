//! In-process document store with push change notifications.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{Query, RemoteGateway};
use crate::cache::ID_FIELD;

type Collections = BTreeMap<String, BTreeMap<String, Map<String, Value>>>;

/// Document store kept in memory.
///
/// Every write broadcasts the collection name, so watches react without
/// waiting for their poll interval. `set_failing(true)` makes every call
/// return an error while leaving the store marked available.
pub struct MemoryGateway {
  collections: Mutex<Collections>,
  changes: broadcast::Sender<String>,
  failing: AtomicBool,
  upserts: AtomicUsize,
}

impl Default for MemoryGateway {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryGateway {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(256);
    Self {
      collections: Mutex::new(BTreeMap::new()),
      changes,
      failing: AtomicBool::new(false),
      upserts: AtomicUsize::new(0),
    }
  }

  /// Make every subsequent call fail (or succeed again).
  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  /// Number of merge-upserts attempted, failed ones included.
  pub fn upsert_count(&self) -> usize {
    self.upserts.load(Ordering::SeqCst)
  }

  /// Number of documents currently stored in `collection`.
  pub fn len(&self, collection: &str) -> usize {
    self
      .collections
      .lock()
      .map(|c| c.get(collection).map_or(0, BTreeMap::len))
      .unwrap_or(0)
  }

  pub fn is_empty(&self, collection: &str) -> bool {
    self.len(collection) == 0
  }

  fn check(&self, op: &str) -> Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(eyre!("Injected remote failure during {}", op));
    }
    Ok(())
  }

  fn notify(&self, collection: &str) {
    // No receivers is fine
    let _ = self.changes.send(collection.to_string());
  }

  fn with_id(id: &str, fields: &Map<String, Value>) -> Value {
    let mut document = fields.clone();
    document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(document)
  }
}

impl RemoteGateway for MemoryGateway {
  fn is_available(&self) -> bool {
    true
  }

  fn run_query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Vec<Value>>> {
    Box::pin(async move {
      self.check("query")?;
      let collections = self
        .collections
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;

      let mut documents: Vec<Value> = collections
        .get(&query.collection)
        .into_iter()
        .flat_map(|docs| docs.iter())
        .filter(|(_, fields)| query.matches(fields))
        .map(|(id, fields)| Self::with_id(id, fields))
        .collect();

      if let Some(field) = &query.order_by {
        documents.sort_by(|a, b| {
          let a = a.get(field).map(Value::to_string).unwrap_or_default();
          let b = b.get(field).map(Value::to_string).unwrap_or_default();
          a.cmp(&b)
        });
      }
      if let Some(limit) = query.limit {
        documents.truncate(limit);
      }

      Ok(documents)
    })
  }

  fn get_document<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> BoxFuture<'a, Result<Option<Value>>> {
    Box::pin(async move {
      self.check("get")?;
      let collections = self
        .collections
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;

      Ok(
        collections
          .get(collection)
          .and_then(|docs| docs.get(id))
          .map(|fields| Self::with_id(id, fields)),
      )
    })
  }

  fn merge_upsert<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
    fields: Map<String, Value>,
    stamp_field: &'a str,
  ) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
      self.upserts.fetch_add(1, Ordering::SeqCst);
      self.check("upsert")?;

      let merged = {
        let mut collections = self
          .collections
          .lock()
          .map_err(|e| eyre!("Lock poisoned: {}", e))?;
        let document = collections
          .entry(collection.to_string())
          .or_default()
          .entry(id.to_string())
          .or_default();

        for (key, value) in fields {
          if key != ID_FIELD {
            document.insert(key, value);
          }
        }
        document.insert(
          stamp_field.to_string(),
          Value::String(Utc::now().to_rfc3339()),
        );
        Self::with_id(id, document)
      };

      self.notify(collection);
      Ok(merged)
    })
  }

  fn delete_document<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
      self.check("delete")?;
      {
        let mut collections = self
          .collections
          .lock()
          .map_err(|e| eyre!("Lock poisoned: {}", e))?;
        if let Some(docs) = collections.get_mut(collection) {
          docs.remove(id);
        }
      }

      self.notify(collection);
      Ok(())
    })
  }

  fn changes(&self) -> Option<broadcast::Receiver<String>> {
    Some(self.changes.subscribe())
  }
}
