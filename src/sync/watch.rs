//! Standing watches over remote queries and documents.
//!
//! A watch re-runs its query whenever the gateway pushes a change for the
//! watched collection, or on every poll tick when it cannot push. Snapshots
//! are digested and the callback only fires when the digest moves.

use color_eyre::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{decode_records, SyncLayer};
use crate::cache::{decode_record, CacheStorage, Record};
use crate::model::EntityKind;
use crate::remote::{Query, RemoteGateway};

/// Cancellation handle for a live subscription.
///
/// Dropping the handle cancels the subscription too.
#[must_use = "dropping a Subscription cancels it"]
#[derive(Debug)]
pub struct Subscription {
  task: Option<JoinHandle<()>>,
}

impl Subscription {
  /// Handle for a subscription that never started.
  pub fn noop() -> Self {
    Self { task: None }
  }

  pub(crate) fn spawn<F>(watch: F) -> Self
  where
    F: Future<Output = ()> + Send + 'static,
  {
    Self {
      task: Some(tokio::spawn(watch)),
    }
  }

  /// Whether the underlying watch is still running.
  pub fn is_active(&self) -> bool {
    self.task.as_ref().is_some_and(|task| !task.is_finished())
  }

  /// Stop the watch. No callback runs after this returns.
  pub fn cancel(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.stop();
  }
}

/// Everything a spawned watch needs, detached from the sync layer.
pub(crate) struct Watcher {
  pub(crate) remote: Arc<dyn RemoteGateway>,
  pub(crate) poll_interval: Duration,
  pub(crate) remote_timeout: Duration,
}

/// Stable digest of a snapshot.
fn digest(snapshot: &Value) -> String {
  let bytes = serde_json::to_vec(snapshot).unwrap_or_default();
  hex::encode(Sha256::digest(&bytes))
}

impl Watcher {
  /// Loop forever, handing every changed snapshot to `on_change`.
  ///
  /// `read` produces the current snapshot. Failed reads are logged and
  /// retried on the next wake-up.
  pub(crate) async fn run<R, Fut, H>(self, collection: String, mut read: R, mut on_change: H)
  where
    R: FnMut(Arc<dyn RemoteGateway>) -> Fut + Send,
    Fut: Future<Output = Result<Value>> + Send,
    H: FnMut(Value) + Send,
  {
    let mut changes = self.remote.changes();
    let mut ticker = tokio::time::interval(self.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    let mut last: Option<String> = None;
    debug!(collection = %collection, "watch started");

    loop {
      match tokio::time::timeout(self.remote_timeout, read(Arc::clone(&self.remote))).await {
        Ok(Ok(snapshot)) => {
          let current = digest(&snapshot);
          if last.as_deref() != Some(current.as_str()) {
            last = Some(current);
            on_change(snapshot);
          }
        }
        Ok(Err(e)) => warn!(collection = %collection, error = %e, "watch read failed"),
        Err(_) => warn!(collection = %collection, "watch read timed out"),
      }

      wait_for_change(&mut ticker, &mut changes, &collection).await;
    }
  }
}

enum Wake {
  Now,
  Ignore,
  Closed,
}

/// Wait for a push notification about `collection` or the next poll tick.
async fn wait_for_change(
  ticker: &mut Interval,
  changes: &mut Option<broadcast::Receiver<String>>,
  collection: &str,
) {
  loop {
    let wake = match changes.as_mut() {
      None => {
        ticker.tick().await;
        Wake::Now
      }
      Some(rx) => {
        tokio::select! {
          _ = ticker.tick() => Wake::Now,
          received = rx.recv() => match received {
            Ok(name) if name == collection => Wake::Now,
            Ok(_) => Wake::Ignore,
            Err(RecvError::Lagged(_)) => Wake::Now,
            Err(RecvError::Closed) => Wake::Closed,
          },
        }
      }
    };

    match wake {
      Wake::Now => return,
      Wake::Ignore => continue,
      Wake::Closed => {
        *changes = None;
        return;
      }
    }
  }
}

impl<S: CacheStorage> SyncLayer<S> {
  pub(crate) fn watcher(&self) -> Watcher {
    Watcher {
      remote: Arc::clone(&self.remote),
      poll_interval: self.poll_interval,
      remote_timeout: self.remote_timeout,
    }
  }

  /// Watch a query, delivering the full result set on every change.
  ///
  /// Without a reachable remote the callback runs once with an empty list
  /// and a no-op handle is returned.
  pub fn watch_query<T, F>(&self, query: Query, mut callback: F) -> Subscription
  where
    T: Record,
    F: FnMut(Vec<T>) + Send + 'static,
  {
    if !self.remote.is_available() {
      callback(Vec::new());
      return Subscription::noop();
    }

    let collection = query.collection.clone();
    let decode_collection = collection.clone();
    let read = move |remote: Arc<dyn RemoteGateway>| {
      let query = query.clone();
      async move { remote.run_query(&query).await.map(Value::Array) }
    };

    Subscription::spawn(self.watcher().run(collection, read, move |snapshot| {
      let documents = match snapshot {
        Value::Array(documents) => documents,
        _ => Vec::new(),
      };
      callback(decode_records(&decode_collection, documents));
    }))
  }

  /// Watch orders, optionally for one tenant.
  pub fn listen_orders<T, F>(&self, tenant: Option<&str>, callback: F) -> Subscription
  where
    T: Record,
    F: FnMut(Vec<T>) + Send + 'static,
  {
    let query = Query::collection(EntityKind::Orders.collection()).tenant(tenant);
    self.watch_query(query, callback)
  }

  /// Watch a single document. The callback only runs while it exists.
  pub fn watch_document<T, F>(&self, collection: &str, id: &str, mut callback: F) -> Subscription
  where
    T: Record,
    F: FnMut(T) + Send + 'static,
  {
    if !self.remote.is_available() {
      return Subscription::noop();
    }

    let read_collection = collection.to_string();
    let id = id.to_string();
    let read = move |remote: Arc<dyn RemoteGateway>| {
      let collection = read_collection.clone();
      let id = id.clone();
      async move {
        let document = remote.get_document(&collection, &id).await?;
        Ok::<_, color_eyre::Report>(document.unwrap_or(Value::Null))
      }
    };

    let collection = collection.to_string();
    let log_collection = collection.clone();
    Subscription::spawn(self.watcher().run(collection, read, move |snapshot| {
      if snapshot.is_null() {
        return;
      }
      match decode_record(snapshot) {
        Ok(record) => callback(record),
        Err(e) => debug!(collection = %log_collection, error = %e, "skipping malformed document"),
      }
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::model::Order;
  use crate::remote::{MemoryGateway, Offline};
  use crate::sync::FetchOptions;
  use serde_json::json;
  use std::sync::Mutex;

  fn online() -> (SyncLayer<MemoryStorage>, Arc<MemoryGateway>) {
    let gateway = Arc::new(MemoryGateway::new());
    let layer = SyncLayer::new(MemoryStorage::new(), gateway.clone())
      .with_poll_interval(Duration::from_secs(60));
    (layer, gateway)
  }

  fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl FnMut(T) + Send + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |item| sink.lock().unwrap().push(item))
  }

  #[test]
  fn test_digest_is_order_sensitive() {
    assert_eq!(digest(&json!([1, 2])), digest(&json!([1, 2])));
    assert_ne!(digest(&json!([1, 2])), digest(&json!([2, 1])));
  }

  #[tokio::test]
  async fn test_listen_orders_without_remote_yields_empty_once() {
    let layer = SyncLayer::new(MemoryStorage::new(), Arc::new(Offline));
    let (seen, sink) = recorder::<Vec<Order>>();

    let subscription = layer.listen_orders(None, sink);
    assert!(!subscription.is_active());
    assert_eq!(*seen.lock().unwrap(), vec![Vec::<Order>::new()]);
  }

  #[tokio::test]
  async fn test_listen_orders_delivers_initial_and_changed_sets() {
    let (layer, _gateway) = online();
    layer
      .save("orders", "orders", json!({"id": "o1", "instanceId": "A"}), false)
      .await
      .unwrap();

    let (seen, sink) = recorder::<Vec<Order>>();
    let subscription = layer.listen_orders(Some("A"), sink);
    tokio::time::sleep(Duration::from_millis(50)).await;

    layer
      .save("orders", "orders", json!({"id": "o2", "instanceId": "A"}), false)
      .await
      .unwrap();
    // Other tenants do not change the watched result set
    layer
      .save("orders", "orders", json!({"id": "o3", "instanceId": "B"}), false)
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshots = seen.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].len(), 1);
    assert_eq!(snapshots[1].len(), 2);
    subscription.cancel();
  }

  #[tokio::test]
  async fn test_cancel_stops_delivery() {
    let (layer, _gateway) = online();
    let (seen, sink) = recorder::<Vec<Value>>();

    let subscription = layer.watch_query(Query::collection("links"), sink);
    tokio::time::sleep(Duration::from_millis(30)).await;
    subscription.cancel();

    layer.save("links", "links", json!({"id": "l1"}), false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_watch_document_only_fires_while_present() {
    let (layer, _gateway) = online();
    let (seen, sink) = recorder::<Value>();

    let _subscription = layer.watch_document("orders", "o9", sink);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(seen.lock().unwrap().is_empty());

    layer
      .save("orders", "orders", json!({"id": "o9", "status": "packed"}), false)
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let documents = seen.lock().unwrap().clone();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["status"], "packed");
  }

  #[tokio::test]
  async fn test_zero_intervals_are_clamped() {
    let layer = SyncLayer::new(MemoryStorage::new(), Arc::new(MemoryGateway::new()))
      .with_poll_interval(Duration::ZERO)
      .with_remote_timeout(Duration::ZERO);
    assert_eq!(layer.poll_interval, Duration::from_millis(1));
    assert_eq!(layer.remote_timeout, Duration::from_millis(1));

    let (seen, sink) = recorder::<Vec<Value>>();
    let subscription = layer.watch_query(Query::collection("groups"), sink);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(subscription.is_active());
    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_polls_when_gateway_cannot_push() {
    struct Polled(MemoryGateway);

    impl RemoteGateway for Polled {
      fn is_available(&self) -> bool {
        true
      }

      fn run_query<'a>(
        &'a self,
        query: &'a Query,
      ) -> futures::future::BoxFuture<'a, Result<Vec<Value>>> {
        self.0.run_query(query)
      }

      fn get_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
      ) -> futures::future::BoxFuture<'a, Result<Option<Value>>> {
        self.0.get_document(collection, id)
      }

      fn merge_upsert<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
        fields: serde_json::Map<String, Value>,
        stamp_field: &'a str,
      ) -> futures::future::BoxFuture<'a, Result<Value>> {
        self.0.merge_upsert(collection, id, fields, stamp_field)
      }

      fn delete_document<'a>(
        &'a self,
        collection: &'a str,
        id: &'a str,
      ) -> futures::future::BoxFuture<'a, Result<()>> {
        self.0.delete_document(collection, id)
      }
    }

    let layer = SyncLayer::new(MemoryStorage::new(), Arc::new(Polled(MemoryGateway::new())))
      .with_poll_interval(Duration::from_millis(200));
    let (seen, sink) = recorder::<Vec<Value>>();
    let _subscription = layer.watch_query(Query::collection("firms"), sink);
    tokio::time::sleep(Duration::from_millis(20)).await;

    layer.save("firms", "firms", json!({"id": "f1"}), false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    // No push channel, so the write is only seen on the next tick
    assert_eq!(seen.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);

    // The fetch path is unaffected by running watches
    let fetched: Vec<Value> = layer
      .fetch("firms", "firms", FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(fetched.len(), 1);
  }
}
