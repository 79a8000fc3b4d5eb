//! Serde helpers for numbers typed in by hand.
//!
//! Console forms submit quantities as text, so numeric fields accept JSON
//! numbers and numeric strings alike.

use serde::{de::Error, Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// A number or numeric string. Null and blank text read as zero.
pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
  D: Deserializer<'de>,
{
  parse(Value::deserialize(deserializer)?).map(Option::unwrap_or_default)
}

/// Like [`number`], with null and blank text read as `None`.
pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  parse(Value::deserialize(deserializer)?)
}

fn parse<E: Error>(value: Value) -> Result<Option<f64>, E> {
  match value {
    Value::Null => Ok(None),
    Value::Number(n) => n
      .as_f64()
      .map(Some)
      .ok_or_else(|| E::custom("number out of range")),
    Value::String(text) if text.trim().is_empty() => Ok(None),
    Value::String(text) => text
      .trim()
      .parse::<f64>()
      .ok()
      .filter(|n| n.is_finite())
      .map(Some)
      .ok_or_else(|| E::custom(format!("not a number: {:?}", text))),
    other => Err(E::custom(format!("not a number: {}", other))),
  }
}

/// Whole numbers are written as integers, so `3` stays `3`.
pub fn write_number<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
  S: Serializer,
{
  if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
    serializer.serialize_i64(*value as i64)
  } else {
    serializer.serialize_f64(*value)
  }
}

pub fn write_optional_number<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
  S: Serializer,
{
  match value {
    Some(value) => write_number(value, serializer),
    None => serializer.serialize_none(),
  }
}

#[cfg(test)]
mod tests {
  use crate::model::{InventoryItem, OrderLine};
  use serde_json::json;

  #[test]
  fn test_numeric_text_is_accepted() {
    let item: InventoryItem = serde_json::from_value(json!({"quantity": " 5 "})).unwrap();
    assert_eq!(item.quantity, 5.0);

    let item: InventoryItem = serde_json::from_value(json!({"quantity": ""})).unwrap();
    assert_eq!(item.quantity, 0.0);
  }

  #[test]
  fn test_fractions_survive() {
    let line: OrderLine =
      serde_json::from_value(json!({"name": "Rope", "quantity": 2.5, "price": "12.75"})).unwrap();
    assert_eq!(line.quantity, 2.5);
    assert_eq!(line.price, Some(12.75));
    assert_eq!(
      serde_json::to_value(&line).unwrap(),
      json!({"name": "Rope", "quantity": 2.5, "price": 12.75})
    );
  }

  #[test]
  fn test_whole_numbers_stay_integers() {
    let item: InventoryItem = serde_json::from_value(json!({"quantity": 40})).unwrap();
    assert_eq!(serde_json::to_value(&item).unwrap()["quantity"], json!(40));
  }

  #[test]
  fn test_words_are_rejected() {
    assert!(serde_json::from_value::<InventoryItem>(json!({"quantity": "lots"})).is_err());
    assert!(serde_json::from_value::<InventoryItem>(json!({"quantity": "NaN"})).is_err());
  }
}
