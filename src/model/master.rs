//! Slugged identifiers for simple string lists.

use serde_json::Map;

use super::MasterRecord;

/// Deterministic id for `value` in the list `list_type`.
///
/// Lower-cases, collapses whitespace runs to `_` and prefixes the list tag,
/// so adding the same value twice targets the same record.
pub fn slug_id(list_type: &str, value: &str) -> String {
  let slug = value
    .split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join("_");
  format!("{}_{}", list_type, slug)
}

impl MasterRecord {
  pub fn new(list_type: &str, value: &str, tenant: Option<&str>) -> Self {
    Self {
      id: Some(slug_id(list_type, value)),
      instance_id: tenant.map(String::from),
      updated_at: None,
      list_type: list_type.to_string(),
      value: value.trim().to_string(),
      extra: Map::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_slug_collapses_whitespace() {
    assert_eq!(slug_id("brand", "  Acme   Foods\tLtd "), "brand_acme_foods_ltd");
  }

  #[test]
  fn test_slug_is_case_insensitive() {
    assert_eq!(slug_id("category", "Cold Chain"), slug_id("category", "cold  CHAIN"));
  }

  #[test]
  fn test_new_record() {
    let record = MasterRecord::new("unit", " Box ", Some("A"));
    assert_eq!(record.id.as_deref(), Some("unit_box"));
    assert_eq!(record.value, "Box");
    assert_eq!(record.instance_id.as_deref(), Some("A"));
  }
}
