//! Entity shapes for the operations console.
//!
//! Every entity is a loosely-typed record: the fields the console relies on
//! are named, and anything else survives in `extra`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;
use crate::cache::Record;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  /// One of the roles in [`crate::model::permissions::ROLES`]
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Line item nested in an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_id: Option<String>,
  #[serde(default)]
  pub name: String,
  #[serde(
    default,
    deserialize_with = "lenient::number",
    serialize_with = "lenient::write_number"
  )]
  pub quantity: f64,
  #[serde(
    default,
    deserialize_with = "lenient::optional_number",
    serialize_with = "lenient::write_optional_number",
    skip_serializing_if = "Option::is_none"
  )]
  pub price: Option<f64>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub customer_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub customer_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  #[serde(default)]
  pub items: Vec<OrderLine>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub remarks: Option<String>,
  /// Display-formatted creation time
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub brand: Option<String>,
  #[serde(
    default,
    deserialize_with = "lenient::number",
    serialize_with = "lenient::write_number"
  )]
  pub quantity: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub unit: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub remarks: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Stock movement against an inventory item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLog {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub item_name: Option<String>,
  /// Signed quantity delta
  #[serde(
    default,
    deserialize_with = "lenient::number",
    serialize_with = "lenient::write_number"
  )]
  pub change: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub performed_by: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub remarks: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firm {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contact: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Bookmark shown on the console dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub url: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub name: String,
  /// User ids
  #[serde(default)]
  pub members: Vec<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Module allow-list for one role. The id is the role name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub modules: Vec<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// One entry of a simple string list (brands, categories, units...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterRecord {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(rename = "type", default)]
  pub list_type: String,
  #[serde(default)]
  pub value: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Addressed notification signal, deleted once acknowledged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub instance_id: Option<String>,
  #[serde(default)]
  pub target_id: String,
  #[serde(default)]
  pub sender_id: String,
  #[serde(default)]
  pub sender_name: String,
  /// Assigned by the remote store
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<DateTime<Utc>>,
  #[serde(default)]
  pub played: bool,
  /// Manually sent pings play an audible alert
  #[serde(default)]
  pub manual: bool,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

macro_rules! impl_record {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Record for $ty {
        fn id(&self) -> Option<&str> {
          self.id.as_deref()
        }

        fn set_id(&mut self, id: String) {
          self.id = Some(id);
        }

        fn instance_id(&self) -> Option<&str> {
          self.instance_id.as_deref()
        }

        fn updated_at(&self) -> Option<DateTime<Utc>> {
          self.updated_at
        }

        fn set_updated_at(&mut self, at: DateTime<Utc>) {
          self.updated_at = Some(at);
        }

        fn extra_mut(&mut self) -> Option<&mut Map<String, Value>> {
          Some(&mut self.extra)
        }
      }
    )*
  };
}

impl_record!(
  User,
  Order,
  Customer,
  InventoryItem,
  InventoryLog,
  Firm,
  Link,
  Group,
  RolePermission,
  MasterRecord,
);

impl Record for Ping {
  fn id(&self) -> Option<&str> {
    self.id.as_deref()
  }

  fn set_id(&mut self, id: String) {
    self.id = Some(id);
  }

  fn instance_id(&self) -> Option<&str> {
    self.instance_id.as_deref()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.timestamp
  }

  fn set_updated_at(&mut self, at: DateTime<Utc>) {
    self.timestamp = Some(at);
  }

  fn extra_mut(&mut self) -> Option<&mut Map<String, Value>> {
    Some(&mut self.extra)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_unknown_fields_are_kept() {
    let raw = json!({
      "id": "o1",
      "instanceId": "A",
      "customerName": "Ravi Traders",
      "items": [{"name": "Pallet", "quantity": 3, "batch": "B7"}],
      "vehicleNo": "KA-01-1234",
    });

    let order: Order = serde_json::from_value(raw.clone()).unwrap();
    assert_eq!(order.customer_name.as_deref(), Some("Ravi Traders"));
    assert_eq!(order.items[0].quantity, 3.0);
    assert_eq!(order.extra["vehicleNo"], "KA-01-1234");
    assert_eq!(serde_json::to_value(&order).unwrap(), raw);
  }

  #[test]
  fn test_master_record_type_field() {
    let record: MasterRecord =
      serde_json::from_value(json!({"id": "brand_acme", "type": "brand", "value": "Acme"})).unwrap();
    assert_eq!(record.list_type, "brand");
    assert!(record.extra.is_empty());
  }

  #[test]
  fn test_ping_timestamp_is_its_refresh_stamp() {
    let mut ping = Ping::default();
    let now = Utc::now();
    ping.set_updated_at(now);
    assert_eq!(ping.timestamp, Some(now));
    assert_eq!(ping.updated_at(), Some(now));
  }

  #[test]
  fn test_missing_fields_default() {
    let item: InventoryItem = serde_json::from_value(json!({"name": "Shrink wrap"})).unwrap();
    assert_eq!(item.quantity, 0.0);
    assert_eq!(item.id(), None);
    assert!(item.visible_to(Some("anyone")));
  }
}
