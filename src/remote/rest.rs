//! Gateway over a Firestore-compatible REST document API.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use url::Url;

use super::wire::{encode_fields, encode_value, field_path, ApiDocument, ApiRunQueryItem};
use super::{Query, RemoteGateway};
use crate::config::RemoteConfig;

/// REST client for one project database.
///
/// There is no push channel, so watches against this gateway poll.
#[derive(Clone)]
pub struct RestGateway {
  http: reqwest::Client,
  /// `{endpoint}/projects/{project}/databases/{database}/documents`
  documents_url: String,
  /// `projects/{project}/databases/{database}/documents`
  documents_name: String,
  api_key: String,
}

impl RestGateway {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("opsdesk/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    let documents_name = format!(
      "projects/{}/databases/{}/documents",
      config.project_id, config.database
    );
    let documents_url = format!("{}/{}", config.endpoint.trim_end_matches('/'), documents_name);

    // Fail early on a malformed endpoint
    Url::parse(&documents_url)
      .map_err(|e| eyre!("Invalid remote endpoint {}: {}", config.endpoint, e))?;

    Ok(Self {
      http,
      documents_url,
      documents_name,
      api_key: config.api_key.clone(),
    })
  }

  fn keyed(&self, mut url: Url) -> Url {
    url.query_pairs_mut().append_pair("key", &self.api_key);
    url
  }

  fn document_url(&self, collection: &str, id: &str) -> Result<Url> {
    let mut url = Url::parse(&self.documents_url)
      .map_err(|e| eyre!("Invalid document URL: {}", e))?;
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Remote endpoint cannot carry a path"))?
      .push(collection)
      .push(id);
    Ok(self.keyed(url))
  }

  fn action_url(&self, action: &str) -> Result<Url> {
    let url = Url::parse(&format!("{}:{}", self.documents_url, action))
      .map_err(|e| eyre!("Invalid {} URL: {}", action, e))?;
    Ok(self.keyed(url))
  }

  fn document_name(&self, collection: &str, id: &str) -> String {
    format!("{}/{}/{}", self.documents_name, collection, id)
  }
}

/// Body of a `:runQuery` request.
pub fn structured_query(query: &Query) -> Value {
  let mut structured = Map::new();
  structured.insert("from".into(), json!([{ "collectionId": query.collection }]));

  let filters: Vec<Value> = query
    .filters
    .iter()
    .map(|(field, value)| {
      json!({
        "fieldFilter": {
          "field": { "fieldPath": field_path(field) },
          "op": "EQUAL",
          "value": encode_value(value),
        }
      })
    })
    .collect();

  match filters.len() {
    0 => {}
    1 => {
      structured.insert("where".into(), filters.into_iter().next().unwrap_or_default());
    }
    _ => {
      structured.insert(
        "where".into(),
        json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
      );
    }
  }

  if let Some(field) = &query.order_by {
    structured.insert(
      "orderBy".into(),
      json!([{ "field": { "fieldPath": field_path(field) }, "direction": "ASCENDING" }]),
    );
  }
  if let Some(limit) = query.limit {
    structured.insert("limit".into(), json!(limit));
  }

  json!({ "structuredQuery": structured })
}

/// Body of a `:commit` request performing a merge write.
pub fn merge_commit(name: &str, fields: &Map<String, Value>, stamp_field: &str) -> Value {
  let field_paths: Vec<String> = fields.keys().map(|k| field_path(k)).collect();
  json!({
    "writes": [{
      "update": { "name": name, "fields": encode_fields(fields) },
      "updateMask": { "fieldPaths": field_paths },
      "updateTransforms": [{
        "fieldPath": field_path(stamp_field),
        "setToServerValue": "REQUEST_TIME",
      }],
    }]
  })
}

impl RemoteGateway for RestGateway {
  fn is_available(&self) -> bool {
    true
  }

  fn run_query<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Vec<Value>>> {
    Box::pin(async move {
      let items: Vec<ApiRunQueryItem> = self
        .http
        .post(self.action_url("runQuery")?)
        .json(&structured_query(query))
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| eyre!("Failed to query {}: {}", query.collection, e))?
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse {} query response: {}", query.collection, e))?;

      Ok(
        items
          .into_iter()
          .filter_map(|item| item.document)
          .map(ApiDocument::into_record)
          .collect(),
      )
    })
  }

  fn get_document<'a>(
    &'a self,
    collection: &'a str,
    id: &'a str,
  ) -> BoxFuture<'a, Result<Option<Value>>> {
    Box::pin(async move {
      let response = self
        .http
        .get(self.document_url(collection, id)?)
        .send()
        .await
        .map_err(|e| eyre!("Failed to get {}/{}: {}", collection, id, e))?;

      if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
      }

      let document: ApiDocument = response
        .error_for_status()
        .map_err(|e| eyre!("Failed to get {}/{}: {}", collection, id, e))?
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse {}/{}: {}", collection, id, e))?;

      Ok(Some(document.into_record()))
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
      let body = merge_commit(&self.document_name(collection, id), &fields, stamp_field);

      self
        .http
        .post(self.action_url("commit")?)
        .json(&body)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| eyre!("Failed to write {}/{}: {}", collection, id, e))?;

      self
        .get_document(collection, id)
        .await?
        .ok_or_else(|| eyre!("Document {}/{} missing after write", collection, id))
    })
  }

  fn delete_document<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
      self
        .http
        .delete(self.document_url(collection, id)?)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| eyre!("Failed to delete {}/{}: {}", collection, id, e))?;
      Ok(())
    })
  }
}
