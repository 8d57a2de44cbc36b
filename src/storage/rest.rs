use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::{Filter, RecordStore, Row, StorageError, IDENTITY_COLUMN};

/// Client for a hosted PostgREST endpoint (`<url>/rest/v1/<table>`).
#[derive(Debug, Clone)]
pub struct PostgrestStore {
    base_url: String,
    client: Client,
}

impl PostgrestStore {
    pub fn new(url: &str, key: &str, timeout: Duration) -> Result<Self, StorageError> {
        let mut headers = HeaderMap::new();
        let api_key = HeaderValue::from_str(key)
            .map_err(|e| StorageError::Request(format!("invalid store key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|e| StorageError::Request(format!("invalid store key: {}", e)))?;
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(PostgrestStore {
            base_url: format!("{}/rest/v1", url.trim_end_matches('/')),
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    /// Query-string pairs for `filter`. PostgREST refuses unfiltered
    /// mutations, so `match_all` substitutes a predicate every row satisfies.
    fn filter_params(filter: &Filter, match_all: bool) -> Vec<(String, String)> {
        if filter.is_empty() && match_all {
            return vec![(IDENTITY_COLUMN.to_string(), "not.is.null".to_string())];
        }
        filter
            .conditions()
            .iter()
            .map(|(column, value)| (column.clone(), format!("eq.{}", filter_literal(value))))
            .collect()
    }

    async fn send(&self, table: &str, request: RequestBuilder) -> Result<Vec<Row>, StorageError> {
        let response = request.send().await?;
        rows_from_response(table, response).await
    }
}

fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn rows_from_response(table: &str, response: Response) -> Result<Vec<Row>, StorageError> {
    let status = response.status();
    if status.as_u16() == 404 {
        return Err(StorageError::TableNotFound(table.to_string()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let body: Value = response.json().await?;
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(StorageError::Decode(format!("expected object row, got {}", other))),
            })
            .collect(),
        other => Err(StorageError::Decode(format!("expected row array, got {}", other))),
    }
}

#[async_trait]
impl RecordStore for PostgrestStore {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError> {
        tracing::debug!(table, ?filter, "select");
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*")])
            .query(&Self::filter_params(filter, false));
        self.send(table, request).await
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StorageError> {
        tracing::debug!(table, "insert");
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        self.send(table, request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Decode(format!("insert into {} returned no row", table)))
    }

    async fn update(&self, table: &str, filter: &Filter, changes: Row) -> Result<Vec<Row>, StorageError> {
        tracing::debug!(table, ?filter, "update");
        let request = self
            .client
            .patch(self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&Self::filter_params(filter, true))
            .json(&changes);
        self.send(table, request).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError> {
        tracing::debug!(table, ?filter, "delete");
        let request = self
            .client
            .delete(self.table_url(table))
            .header("Prefer", "return=representation")
            .query(&Self::filter_params(filter, true));
        self.send(table, request).await
    }

    async fn table_exists(&self, table: &str) -> bool {
        let request = self
            .client
            .get(self.table_url(table))
            .query(&[("select", "*"), ("limit", "1")]);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(table, error = %e, "table probe failed");
                false
            }
        }
    }
}
