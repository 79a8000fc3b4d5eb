//! Per-entity façades over the sync layer.
//!
//! Each façade binds one entity's collection name, cache key and seed
//! records onto the generic fetch/save/remove operations.

use color_eyre::Result;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::model::{
  master, permissions, Customer, Entity, Firm, Group, InventoryItem, InventoryLog, Link,
  MasterRecord, Order, Ping, RolePermission, User,
};
use crate::remote::{self, RemoteGateway};
use crate::sync::{FetchOptions, Subscription, SyncLayer};

/// Typed CRUD for one entity.
pub struct Collection<'a, S: CacheStorage, T: Entity> {
  sync: &'a SyncLayer<S>,
  _entity: PhantomData<T>,
}

impl<'a, S: CacheStorage, T: Entity> Collection<'a, S, T> {
  pub fn new(sync: &'a SyncLayer<S>) -> Self {
    Self {
      sync,
      _entity: PhantomData,
    }
  }

  /// All records visible to `tenant`, falling back to the entity's seed.
  pub async fn fetch(&self, tenant: Option<&str>) -> Result<Vec<T>> {
    let seed = T::seed();
    self
      .fetch_with(FetchOptions {
        tenant,
        seed: &seed,
        bypass_cache: false,
      })
      .await
  }

  pub async fn fetch_with(&self, options: FetchOptions<'_, T>) -> Result<Vec<T>> {
    self
      .sync
      .fetch(T::KIND.collection(), T::KIND.cache_key(), options)
      .await
  }

  pub async fn add(&self, record: T) -> Result<T> {
    self
      .sync
      .save(T::KIND.collection(), T::KIND.cache_key(), record, false)
      .await
  }

  pub async fn update(&self, record: T) -> Result<T> {
    self
      .sync
      .save(T::KIND.collection(), T::KIND.cache_key(), record, true)
      .await
  }

  pub async fn delete(&self, id: &str) -> Result<()> {
    self
      .sync
      .remove(T::KIND.collection(), T::KIND.cache_key(), id)
      .await
  }
}

/// Data access entry point for the console.
pub struct Console<S: CacheStorage> {
  sync: SyncLayer<S>,
}

impl Console<SqliteStorage> {
  /// Open the SQLite cache and connect the gateway described by `config`.
  pub fn open(config: &Config) -> Result<Self> {
    let storage = SqliteStorage::open(config.cache.path.as_deref())?;
    let remote = remote::connect(&config.remote)?;
    Ok(Self::new(SyncLayer::new(storage, remote).with_config(&config.sync)))
  }
}

impl<S: CacheStorage> Console<S> {
  pub fn new(sync: SyncLayer<S>) -> Self {
    Self { sync }
  }

  /// Build a console over explicit storage and gateway.
  pub fn with_parts(storage: S, remote: Arc<dyn RemoteGateway>) -> Self {
    Self::new(SyncLayer::new(storage, remote))
  }

  pub fn sync(&self) -> &SyncLayer<S> {
    &self.sync
  }

  pub fn users(&self) -> Collection<'_, S, User> {
    Collection::new(&self.sync)
  }

  pub fn orders(&self) -> Collection<'_, S, Order> {
    Collection::new(&self.sync)
  }

  pub fn customers(&self) -> Collection<'_, S, Customer> {
    Collection::new(&self.sync)
  }

  pub fn inventory_items(&self) -> Collection<'_, S, InventoryItem> {
    Collection::new(&self.sync)
  }

  pub fn inventory_logs(&self) -> Collection<'_, S, InventoryLog> {
    Collection::new(&self.sync)
  }

  pub fn firms(&self) -> Collection<'_, S, Firm> {
    Collection::new(&self.sync)
  }

  pub fn links(&self) -> Collection<'_, S, Link> {
    Collection::new(&self.sync)
  }

  pub fn groups(&self) -> Collection<'_, S, Group> {
    Collection::new(&self.sync)
  }

  pub fn role_permissions(&self) -> Collection<'_, S, RolePermission> {
    Collection::new(&self.sync)
  }

  pub fn master_records(&self) -> Collection<'_, S, MasterRecord> {
    Collection::new(&self.sync)
  }

  pub fn pings(&self) -> Collection<'_, S, Ping> {
    Collection::new(&self.sync)
  }

  /// Modules `role` may open, from stored permissions or the defaults.
  pub async fn permissions_for(&self, role: &str, tenant: Option<&str>) -> Result<Vec<String>> {
    let stored = self.role_permissions().fetch(tenant).await?;
    Ok(permissions::resolve(role, &stored))
  }

  /// Values of the master list `list_type`.
  pub async fn fetch_master_values(
    &self,
    list_type: &str,
    tenant: Option<&str>,
  ) -> Result<Vec<MasterRecord>> {
    Ok(
      self
        .master_records()
        .fetch(tenant)
        .await?
        .into_iter()
        .filter(|record| record.list_type == list_type)
        .collect(),
    )
  }

  /// Add `value` to the master list `list_type`. Adding it twice is a no-op
  /// in the cache.
  pub async fn add_master_value(
    &self,
    list_type: &str,
    value: &str,
    tenant: Option<&str>,
  ) -> Result<MasterRecord> {
    self
      .master_records()
      .add(MasterRecord::new(list_type, value, tenant))
      .await
  }

  pub async fn remove_master_value(&self, list_type: &str, value: &str) -> Result<()> {
    self
      .master_records()
      .delete(&master::slug_id(list_type, value))
      .await
  }

  /// Live order list for `tenant`.
  pub fn listen_orders<F>(&self, tenant: Option<&str>, callback: F) -> Subscription
  where
    F: FnMut(Vec<Order>) + Send + 'static,
  {
    self.sync.listen_orders(tenant, callback)
  }

  /// Live state of one order.
  pub fn watch_order<F>(&self, id: &str, callback: F) -> Subscription
  where
    F: FnMut(Order) + Send + 'static,
  {
    self.sync.watch_document(Order::KIND.collection(), id, callback)
  }

  pub async fn send_ping(
    &self,
    target_id: &str,
    sender_id: &str,
    sender_name: &str,
    tenant: Option<&str>,
    manual: bool,
  ) -> Option<Ping> {
    self
      .sync
      .send_ping(target_id, sender_id, sender_name, tenant, manual)
      .await
  }

  pub fn subscribe_pings<F>(&self, user_id: &str, callback: F) -> Subscription
  where
    F: FnMut(Ping) + Send + 'static,
  {
    self.sync.subscribe_pings(user_id, callback)
  }

  pub async fn ack_ping(&self, ping_id: &str) {
    self.sync.ack_ping(ping_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::remote::{MemoryGateway, Offline};
  use serde_json::{json, Value};

  fn offline() -> Console<MemoryStorage> {
    Console::with_parts(MemoryStorage::new(), Arc::new(Offline))
  }

  #[tokio::test]
  async fn test_permissions_fall_back_to_defaults() {
    let console = offline();
    let modules = console.permissions_for("staff", None).await.unwrap();
    assert_eq!(modules, vec!["dashboard", "inventory", "notifications"]);

    // Seeds are served but never written
    assert!(console.sync().cache().load::<RolePermission>("permissions").is_empty());
  }

  #[tokio::test]
  async fn test_stored_permissions_override_defaults() {
    let console = offline();
    console
      .role_permissions()
      .add(RolePermission {
        id: Some("viewer".into()),
        modules: vec!["dashboard".into(), "reports".into()],
        ..RolePermission::default()
      })
      .await
      .unwrap();

    let modules = console.permissions_for("viewer", None).await.unwrap();
    assert_eq!(modules, vec!["dashboard", "reports"]);
    // Roles without a stored record keep their defaults
    assert!(console.permissions_for("admin", None).await.unwrap().contains(&"settings".to_string()));
  }

  #[tokio::test]
  async fn test_master_values_are_idempotent() {
    let console = offline();
    console.add_master_value("brand", "Acme Foods", None).await.unwrap();
    console.add_master_value("brand", "acme   foods", None).await.unwrap();
    console.add_master_value("category", "Frozen", None).await.unwrap();

    let brands = console.fetch_master_values("brand", None).await.unwrap();
    assert_eq!(brands.len(), 1);
    assert_eq!(brands[0].value, "Acme Foods");

    console.remove_master_value("brand", "ACME FOODS").await.unwrap();
    assert!(console.fetch_master_values("brand", None).await.unwrap().is_empty());
    assert_eq!(console.fetch_master_values("category", None).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_entity_round_trip_through_remote() {
    let gateway = Arc::new(MemoryGateway::new());
    let console = Console::with_parts(MemoryStorage::new(), gateway.clone());

    let item = console
      .inventory_items()
      .add(InventoryItem {
        name: "Stretch film".into(),
        quantity: 40.0,
        instance_id: Some("A".into()),
        ..InventoryItem::default()
      })
      .await
      .unwrap();
    let id = item.id.clone().unwrap();

    let updated = console
      .inventory_items()
      .update(InventoryItem {
        quantity: 35.0,
        ..item
      })
      .await
      .unwrap();
    assert_eq!(updated.id.as_deref(), Some(id.as_str()));

    let items = console.inventory_items().fetch(Some("A")).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 35.0);
    assert!(console.inventory_items().fetch(Some("B")).await.unwrap().is_empty());

    console.inventory_items().delete(&id).await.unwrap();
    assert!(gateway.is_empty("inventory"));
  }

  #[tokio::test]
  async fn test_loosely_shaped_records_are_kept() {
    let gateway = Arc::new(MemoryGateway::new());
    let console = Console::with_parts(MemoryStorage::new(), gateway.clone());
    let sync = console.sync();
    for record in [
      json!({"id": "i1", "name": "Tape", "quantity": "5"}),
      json!({"id": "i2", "name": "Twine", "quantity": 2.5}),
      json!({"id": "i3", "name": "Film", "quantity": 3}),
      json!({"id": "i4", "name": "Crates", "quantity": "a few"}),
    ] {
      sync
        .save("inventory", "inventory_items", record, false)
        .await
        .unwrap();
    }

    let items = console.inventory_items().fetch(None).await.unwrap();
    let quantities: Vec<f64> = items.iter().map(|item| item.quantity).collect();
    assert_eq!(quantities, vec![5.0, 2.5, 3.0, 0.0]);
    assert_eq!(items[3].extra["quantity"], "a few");

    let cached: Vec<Value> = sync.cache().load("inventory_items");
    assert_eq!(cached.len(), 4);
    assert_eq!(cached[0]["quantity"], "5");

    // Served from the cache once the remote fails
    gateway.set_failing(true);
    let items = console.inventory_items().fetch(None).await.unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[1].quantity, 2.5);
    assert_eq!(serde_json::to_value(&items[3]).unwrap()["quantity"], "a few");
  }
}
