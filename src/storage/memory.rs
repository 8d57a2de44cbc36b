use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Filter, RecordStore, Row, StorageError, IDENTITY_COLUMN};

#[derive(Debug, Default)]
struct Table {
    next_id: i64,
    rows: Vec<Row>,
}

/// Process-local store. Tables must be created before use, mirroring a
/// provisioned database schema.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_tables<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = names
            .into_iter()
            .map(|name| (name.into(), Table::default()))
            .collect();
        MemoryStore {
            tables: RwLock::new(tables),
        }
    }

    pub async fn row_count(&self, name: &str) -> usize {
        self.tables
            .read()
            .await
            .get(name)
            .map_or(0, |table| table.rows.len())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError> {
        let tables = self.tables.read().await;
        let table = tables
            .get(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        Ok(table
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, StorageError> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        table.next_id += 1;
        row.entry(IDENTITY_COLUMN)
            .or_insert_with(|| Value::from(table.next_id));
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, filter: &Filter, changes: Row) -> Result<Vec<Row>, StorageError> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        let mut updated = Vec::new();
        for row in table.rows.iter_mut().filter(|row| filter.matches(row)) {
            for (column, value) in &changes {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StorageError> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;

        let (removed, kept): (Vec<Row>, Vec<Row>) = std::mem::take(&mut table.rows)
            .into_iter()
            .partition(|row| filter.matches(row));
        table.rows = kept;
        Ok(removed)
    }

    async fn table_exists(&self, table: &str) -> bool {
        self.tables.read().await.contains_key(table)
    }
}
