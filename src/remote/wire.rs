//! Typed-value encoding used by the document REST API.
//!
//! The API wraps every field in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "3"}`, ...). These helpers
//! translate between that shape and plain JSON.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::cache::ID_FIELD;

/// Document as returned by the REST API.
#[derive(Debug, Deserialize)]
pub struct ApiDocument {
  pub name: String,
  #[serde(default)]
  pub fields: Map<String, Value>,
}

impl ApiDocument {
  /// Last path segment of the document name.
  pub fn id(&self) -> &str {
    self.name.rsplit('/').next().unwrap_or(&self.name)
  }

  /// Plain JSON object carrying the document id.
  pub fn into_record(self) -> Value {
    let id = self.id().to_string();
    let mut record = decode_fields(self.fields);
    record.insert(ID_FIELD.to_string(), Value::String(id));
    Value::Object(record)
  }
}

/// One element of a `:runQuery` response stream.
#[derive(Debug, Deserialize)]
pub struct ApiRunQueryItem {
  pub document: Option<ApiDocument>,
}

pub fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) => match n.as_i64() {
      Some(i) => json!({ "integerValue": i.to_string() }),
      None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
    },
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => json!({
      "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
    }),
    Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
  }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
  fields
    .iter()
    .map(|(key, value)| (key.clone(), encode_value(value)))
    .collect()
}

pub fn decode_value(value: Value) -> Value {
  let Value::Object(mut wrapper) = value else {
    return Value::Null;
  };

  if let Some(s) = wrapper.remove("integerValue") {
    return match s {
      Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::String(s)),
      other => other,
    };
  }
  if let Some(Value::Object(mut map)) = wrapper.remove("mapValue") {
    let fields = match map.remove("fields") {
      Some(Value::Object(fields)) => fields,
      _ => Map::new(),
    };
    return Value::Object(decode_fields(fields));
  }
  if let Some(Value::Object(mut array)) = wrapper.remove("arrayValue") {
    let values = match array.remove("values") {
      Some(Value::Array(values)) => values,
      _ => Vec::new(),
    };
    return Value::Array(values.into_iter().map(decode_value).collect());
  }

  for key in [
    "stringValue",
    "booleanValue",
    "doubleValue",
    "timestampValue",
    "referenceValue",
    "bytesValue",
    "geoPointValue",
  ] {
    if let Some(v) = wrapper.remove(key) {
      return v;
    }
  }

  Value::Null
}

pub fn decode_fields(fields: Map<String, Value>) -> Map<String, Value> {
  fields
    .into_iter()
    .map(|(key, value)| (key, decode_value(value)))
    .collect()
}

/// Quote a field path segment unless it is a plain identifier.
pub fn field_path(field: &str) -> String {
  let simple = field
    .chars()
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

  if simple {
    field.to_string()
  } else {
    format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_nested_record_survives_encoding() {
    let record = json!({
      "customerName": "Ravi Traders",
      "total": 1250,
      "discount": 2.5,
      "paid": false,
      "note": null,
      "items": [{"sku": "A-1", "qty": 4}],
    });

    let encoded = encode_fields(record.as_object().unwrap());
    assert_eq!(encoded["total"], json!({"integerValue": "1250"}));
    assert_eq!(encoded["discount"], json!({"doubleValue": 2.5}));

    let decoded = Value::Object(decode_fields(encoded));
    assert_eq!(decoded, record);
  }

  #[test]
  fn test_timestamp_decodes_to_string() {
    let decoded = decode_value(json!({"timestampValue": "2026-01-02T03:04:05.123Z"}));
    assert_eq!(decoded, json!("2026-01-02T03:04:05.123Z"));
  }

  #[test]
  fn test_empty_map_and_array() {
    assert_eq!(decode_value(json!({"mapValue": {}})), json!({}));
    assert_eq!(decode_value(json!({"arrayValue": {}})), json!([]));
  }

  #[test]
  fn test_document_into_record_uses_name_suffix() {
    let doc: ApiDocument = serde_json::from_value(json!({
      "name": "projects/p/databases/(default)/documents/pings/ping-1-u2",
      "fields": {"played": {"booleanValue": false}}
    }))
    .unwrap();

    assert_eq!(doc.into_record(), json!({"id": "ping-1-u2", "played": false}));
  }

  #[test]
  fn test_field_path_quoting() {
    assert_eq!(field_path("instanceId"), "instanceId");
    assert_eq!(field_path("line-items"), "`line-items`");
    assert_eq!(field_path("2fa"), "`2fa`");
  }
}
