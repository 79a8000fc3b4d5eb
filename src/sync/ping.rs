//! Addressed notification pings.

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::watch::Subscription;
use super::{record_fields, SyncLayer};
use crate::cache::{decode_record, CacheStorage, ID_FIELD};
use crate::model::{EntityKind, Ping};
use crate::remote::{Query, RemoteGateway};

/// Field the remote store stamps on every ping.
const PING_STAMP_FIELD: &str = "timestamp";

/// Identifier of a ping sent at `millis` to `target_id`.
///
/// Two pings to one target within the same millisecond share an id and the
/// second overwrites the first.
pub fn ping_id(millis: i64, target_id: &str) -> String {
  format!("ping-{}-{}", millis, target_id)
}

impl<S: CacheStorage> SyncLayer<S> {
  /// Send a ping to `target_id`.
  ///
  /// Returns the stored ping, or `None` when it could not reach the remote
  /// store (pings are never cached locally).
  pub async fn send_ping(
    &self,
    target_id: &str,
    sender_id: &str,
    sender_name: &str,
    tenant: Option<&str>,
    manual: bool,
  ) -> Option<Ping> {
    let collection = EntityKind::Pings.collection();
    if !self.remote.is_available() {
      warn!(target_id, "remote unavailable, ping not sent");
      return None;
    }

    let id = ping_id(Utc::now().timestamp_millis(), target_id);
    let ping = Ping {
      id: Some(id.clone()),
      instance_id: tenant.map(String::from),
      target_id: target_id.to_string(),
      sender_id: sender_id.to_string(),
      sender_name: sender_name.to_string(),
      timestamp: None,
      played: false,
      manual,
      extra: Map::new(),
    };

    let fields = match record_fields(&ping) {
      Ok(fields) => fields,
      Err(e) => {
        warn!(id = %id, error = %e, "failed to encode ping");
        return None;
      }
    };

    match self
      .bounded(
        "ping",
        collection,
        self
          .remote
          .merge_upsert(collection, &id, fields, PING_STAMP_FIELD),
      )
      .await
    {
      Ok(document) => {
        info!(id = %id, target_id, manual, "ping sent");
        Some(decode_record(document).unwrap_or(ping))
      }
      Err(e) => {
        warn!(id = %id, error = %e, "failed to send ping");
        None
      }
    }
  }

  /// Watch undelivered pings addressed to `user_id`.
  ///
  /// At most one pending ping is in flight at a time; the callback runs once
  /// for every ping that newly enters that window. Acknowledge each ping
  /// with [`SyncLayer::ack_ping`] to let the next one through.
  pub fn subscribe_pings<F>(&self, user_id: &str, mut callback: F) -> Subscription
  where
    F: FnMut(Ping) + Send + 'static,
  {
    if !self.remote.is_available() {
      return Subscription::noop();
    }

    let query = Query::collection(EntityKind::Pings.collection())
      .where_eq("targetId", user_id)
      .where_eq("played", false)
      .limit(1);
    let collection = query.collection.clone();
    let read = move |remote: Arc<dyn RemoteGateway>| {
      let query = query.clone();
      async move { remote.run_query(&query).await.map(Value::Array) }
    };

    let mut delivered: HashSet<String> = HashSet::new();
    Subscription::spawn(self.watcher().run(collection, read, move |snapshot| {
      let documents = match snapshot {
        Value::Array(documents) => documents,
        _ => Vec::new(),
      };

      let current: HashSet<String> = documents
        .iter()
        .filter_map(|d| d.get(ID_FIELD).and_then(Value::as_str).map(String::from))
        .collect();

      for document in documents {
        let is_new = document
          .get(ID_FIELD)
          .and_then(Value::as_str)
          .is_some_and(|id| !delivered.contains(id));
        if !is_new {
          continue;
        }
        match decode_record::<Ping>(document) {
          Ok(ping) => callback(ping),
          Err(e) => debug!(error = %e, "skipping malformed ping"),
        }
      }

      delivered = current;
    }))
  }

  /// Delete a delivered ping.
  pub async fn ack_ping(&self, ping_id: &str) {
    let collection = EntityKind::Pings.collection();
    if !self.remote.is_available() {
      debug!(ping_id, "remote unavailable, nothing to acknowledge");
      return;
    }

    if let Err(e) = self
      .bounded("ack", collection, self.remote.delete_document(collection, ping_id))
      .await
    {
      warn!(ping_id, error = %e, "failed to acknowledge ping");
    }
  }
}
