//! Record store abstraction
//!
//! Every durable piece of state lives behind [`RecordStore`]:
//! - patients and medical history
//! - the vitals slot tables and the flat vitals table
//!
//! Tables are addressed by name and rows are plain JSON objects, queried
//! and mutated through equality filters.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::PostgrestStore;

use async_trait::async_trait;
use serde_json::Value;

/// A single stored row.
pub type Row = serde_json::Map<String, Value>;

/// Column the store assigns as row identity.
pub const IDENTITY_COLUMN: &str = "id";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed store response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(error: reqwest::Error) -> Self {
        StorageError::Request(error.to_string())
    }
}

/// Conjunction of `column = value` conditions. An empty filter matches
/// every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows of `table` matching `filter`, in store order.
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError>;

    /// Insert one row and return it as stored (identity assigned).
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StorageError>;

    /// Merge `changes` into every matching row and return the updated rows.
    async fn update(&self, table: &str, filter: &Filter, changes: Row) -> Result<Vec<Row>, StorageError>;

    /// Remove every matching row and return what was removed.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError>;

    /// Whether `table` is provisioned. Probe failures count as absent.
    async fn table_exists(&self, table: &str) -> bool;
}
