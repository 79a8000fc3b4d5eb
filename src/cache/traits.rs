//! Core traits for records flowing through the cache and sync layers.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Field carrying the record identifier.
pub const ID_FIELD: &str = "id";

/// Field carrying the tenant discriminator.
pub const TENANT_FIELD: &str = "instanceId";

/// Field stamped by the remote store on every write.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Narrow structural view of a stored record.
///
/// The sync layer only ever looks at the identifier, the tenant and the
/// refresh timestamp. Everything else is carried through serde untouched.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Identifier, unique within a collection. `None` before the first write.
  fn id(&self) -> Option<&str>;

  fn set_id(&mut self, id: String);

  /// Tenant discriminator. Records without one are visible to every tenant.
  fn instance_id(&self) -> Option<&str>;

  /// When the remote store last stamped this record.
  fn updated_at(&self) -> Option<DateTime<Utc>>;

  fn set_updated_at(&mut self, at: DateTime<Utc>);

  /// Fields the typed shape does not name, when it keeps them.
  fn extra_mut(&mut self) -> Option<&mut Map<String, Value>> {
    None
  }

  /// Whether this record should be visible when reading for `tenant`.
  fn visible_to(&self, tenant: Option<&str>) -> bool {
    match (tenant, self.instance_id()) {
      (None, _) | (_, None) => true,
      (Some(wanted), Some(own)) => wanted == own,
    }
  }
}

/// Untyped records, used where the entity shape is not known up front.
///
/// Non-object values have no fields and are never matched by id.
impl Record for Value {
  fn id(&self) -> Option<&str> {
    self.get(ID_FIELD).and_then(Value::as_str)
  }

  fn set_id(&mut self, id: String) {
    if let Some(fields) = self.as_object_mut() {
      fields.insert(ID_FIELD.to_string(), Value::String(id));
    }
  }

  fn instance_id(&self) -> Option<&str> {
    self.get(TENANT_FIELD).and_then(Value::as_str)
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self
      .get(UPDATED_AT_FIELD)
      .and_then(Value::as_str)
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }

  fn set_updated_at(&mut self, at: DateTime<Utc>) {
    if let Some(fields) = self.as_object_mut() {
      fields.insert(UPDATED_AT_FIELD.to_string(), Value::String(at.to_rfc3339()));
    }
  }

  fn extra_mut(&mut self) -> Option<&mut Map<String, Value>> {
    self.as_object_mut()
  }
}

/// Decode a stored document as `T` without losing any of its fields.
///
/// Fields whose values do not fit `T` are moved into its extra fields
/// instead of failing the whole record. Documents that are not objects, or
/// whose id or tenant does not fit, are still rejected.
pub fn decode_record<T: Record>(document: Value) -> serde_json::Result<T> {
  let error = match serde_json::from_value::<T>(document.clone()) {
    Ok(record) => return Ok(record),
    Err(e) => e,
  };
  let Value::Object(fields) = document else {
    return Err(error);
  };

  let mut fitting = Map::new();
  let mut stray = Map::new();
  for (key, value) in fields {
    // Every field has a default, so each one can be tried on its own
    let single = Value::Object(Map::from_iter([(key.clone(), value.clone())]));
    if serde_json::from_value::<T>(single).is_ok() {
      fitting.insert(key, value);
    } else {
      stray.insert(key, value);
    }
  }
  if stray.contains_key(ID_FIELD) || stray.contains_key(TENANT_FIELD) {
    return Err(error);
  }

  let mut record: T = serde_json::from_value(Value::Object(fitting))?;
  match record.extra_mut() {
    Some(extra) => extra.extend(stray),
    None => return Err(error),
  }
  Ok(record)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_untyped_record_fields() {
    let mut record = json!({"name": "Forklift"});
    assert_eq!(record.id(), None);

    record.set_id("inv-1".to_string());
    assert_eq!(record.id(), Some("inv-1"));
    assert_eq!(record["name"], "Forklift");
  }

  #[test]
  fn test_visibility_without_tenant_field() {
    let record = json!({"id": "3"});
    assert!(record.visible_to(Some("A")));
    assert!(record.visible_to(None));
  }

  #[test]
  fn test_visibility_with_tenant_field() {
    let record = json!({"id": "2", "instanceId": "B"});
    assert!(!record.visible_to(Some("A")));
    assert!(record.visible_to(Some("B")));
    assert!(record.visible_to(None));
  }

  #[test]
  fn test_updated_at_round_trips_through_rfc3339() {
    let mut record = json!({"id": "1"});
    let now = Utc::now();
    record.set_updated_at(now);
    assert_eq!(record.updated_at(), Some(now));
  }

  #[test]
  fn test_decode_moves_misfit_fields_into_extra() {
    use crate::model::InventoryItem;

    let item: InventoryItem = decode_record(json!({
      "id": "i9",
      "instanceId": "A",
      "name": "Crates",
      "quantity": "a few",
      "updatedAt": "last tuesday",
    }))
    .unwrap();

    assert_eq!(item.id(), Some("i9"));
    assert_eq!(item.instance_id(), Some("A"));
    assert_eq!(item.name, "Crates");
    assert_eq!(item.updated_at(), None);
    assert_eq!(item.extra["quantity"], "a few");
    assert_eq!(item.extra["updatedAt"], "last tuesday");
  }

  #[test]
  fn test_decode_rejects_unusable_id() {
    use crate::model::InventoryItem;

    assert!(decode_record::<InventoryItem>(json!({"id": 7, "name": "Crates"})).is_err());
    assert!(decode_record::<InventoryItem>(json!(["not", "an", "object"])).is_err());
  }
}
