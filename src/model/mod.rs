//! Business entities and their storage bindings.

mod lenient;
pub mod master;
pub mod permissions;
mod types;

pub use types::{
  Customer, Firm, Group, InventoryItem, InventoryLog, Link, MasterRecord, Order, OrderLine, Ping,
  RolePermission, User,
};

use crate::cache::Record;

/// Storage binding for each entity: remote collection name and cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum EntityKind {
  Users,
  Orders,
  Customers,
  #[value(name = "inventory")]
  InventoryItems,
  InventoryLogs,
  Firms,
  Links,
  Groups,
  #[value(name = "permissions")]
  RolePermissions,
  #[value(name = "master")]
  MasterRecords,
  Pings,
}

impl EntityKind {
  /// Name of the remote collection.
  pub fn collection(self) -> &'static str {
    match self {
      Self::Users => "users",
      Self::Orders => "orders",
      Self::Customers => "customers",
      Self::InventoryItems => "inventory",
      Self::InventoryLogs => "inventory_logs",
      Self::Firms => "firms",
      Self::Links => "links",
      Self::Groups => "groups",
      Self::RolePermissions => "role_permissions",
      Self::MasterRecords => "master_records",
      Self::Pings => "pings",
    }
  }

  /// Logical key in the local cache.
  pub fn cache_key(self) -> &'static str {
    match self {
      Self::Users => "users",
      Self::Orders => "orders",
      Self::Customers => "customers",
      Self::InventoryItems => "inventory_items",
      Self::InventoryLogs => "inventory_logs",
      Self::Firms => "firms",
      Self::Links => "links",
      Self::Groups => "groups",
      Self::RolePermissions => "permissions",
      Self::MasterRecords => "master_records",
      Self::Pings => "pings",
    }
  }
}

/// A record type bound to one collection.
pub trait Entity: Record {
  const KIND: EntityKind;

  /// Records returned when nothing is cached and the remote store is not
  /// reachable. Never persisted.
  fn seed() -> Vec<Self> {
    Vec::new()
  }
}

impl Entity for User {
  const KIND: EntityKind = EntityKind::Users;
}

impl Entity for Order {
  const KIND: EntityKind = EntityKind::Orders;
}

impl Entity for Customer {
  const KIND: EntityKind = EntityKind::Customers;
}

impl Entity for InventoryItem {
  const KIND: EntityKind = EntityKind::InventoryItems;
}

impl Entity for InventoryLog {
  const KIND: EntityKind = EntityKind::InventoryLogs;
}

impl Entity for Firm {
  const KIND: EntityKind = EntityKind::Firms;
}

impl Entity for Link {
  const KIND: EntityKind = EntityKind::Links;
}

impl Entity for Group {
  const KIND: EntityKind = EntityKind::Groups;
}

impl Entity for RolePermission {
  const KIND: EntityKind = EntityKind::RolePermissions;

  fn seed() -> Vec<Self> {
    permissions::default_permissions()
  }
}

impl Entity for MasterRecord {
  const KIND: EntityKind = EntityKind::MasterRecords;
}

impl Entity for Ping {
  const KIND: EntityKind = EntityKind::Pings;
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::ValueEnum;

  #[test]
  fn test_cli_names() {
    let names: Vec<String> = EntityKind::value_variants()
      .iter()
      .filter_map(|k| k.to_possible_value())
      .map(|v| v.get_name().to_string())
      .collect();
    assert!(names.contains(&"inventory".to_string()));
    assert!(names.contains(&"inventory-logs".to_string()));
    assert!(names.contains(&"permissions".to_string()));
  }

  #[test]
  fn test_only_permissions_have_a_seed() {
    assert!(User::seed().is_empty());
    assert_eq!(RolePermission::seed().len(), permissions::ROLES.len());
  }
}
