//! Shift-on-insert rotation across the vitals slot tables.
//!
//! Each insert evicts the oldest provisioned slot, moves every other
//! provisioned slot into the next provisioned one (oldest first) and
//! writes the new record into slot 1. With all N tables present that is
//! slot k into slot k+1 for k = N-1 .. 1. The sequence is a series of
//! independent store calls: a failure part-way leaves earlier shifts
//! committed and is reported to the caller. Rotations issued through one
//! engine are serialized; engines in other processes sharing the store
//! are not coordinated with.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::{RotationScope, VitalsLayout, VitalsRecord};
use crate::storage::{Filter, RecordStore, Row, StorageError, IDENTITY_COLUMN};

pub struct RotationEngine {
    store: Arc<dyn RecordStore>,
    layout: Arc<VitalsLayout>,
    scope: RotationScope,
    in_progress: Mutex<()>,
}

impl RotationEngine {
    pub fn new(store: Arc<dyn RecordStore>, layout: Arc<VitalsLayout>, scope: RotationScope) -> Self {
        RotationEngine {
            store,
            layout,
            scope,
            in_progress: Mutex::new(()),
        }
    }

    pub fn scope(&self) -> RotationScope {
        self.scope
    }

    /// Shift the slot tables and store `record` for `patient_id` in slot 1
    /// (or the flat table when the layout is flat). Returns the row
    /// as stored.
    pub async fn rotate_and_insert(&self, patient_id: &str, mut record: VitalsRecord) -> Result<Row, StorageError> {
        record.patient_id = patient_id.to_string();
        let _guard = self.in_progress.lock().await;

        let scope = self.scope_filter(patient_id);
        let slots: Vec<usize> = self.layout.slots().collect();

        if let Some(&oldest) = slots.last() {
            let evicted = self.store.delete(&self.layout.slot_table(oldest), &scope).await?;
            tracing::debug!(slot = oldest, rows = evicted.len(), "evicted oldest generation");
        }

        for pair in slots.windows(2).rev() {
            self.shift(pair[0], pair[1], &scope).await?;
        }

        let table = if self.layout.is_flat() {
            self.layout.flat_table().to_string()
        } else {
            self.layout.slot_table(1)
        };
        let stored = self.store.insert(&table, record.to_row()).await?;

        tracing::info!(patient_id, table = %table, date = %record.date, "recorded vitals");
        Ok(stored)
    }

    /// Move the rows of slot `from` that fall in `scope` to slot `to`.
    async fn shift(&self, from: usize, to: usize, scope: &Filter) -> Result<(), StorageError> {
        let source = self.layout.slot_table(from);
        let destination = self.layout.slot_table(to);

        let rows = self.store.select(&source, scope).await?;
        for mut row in rows.iter().cloned() {
            row.remove(IDENTITY_COLUMN);
            self.store.insert(&destination, row).await?;
        }
        self.store.delete(&source, scope).await?;

        tracing::debug!(from, to, rows = rows.len(), "shifted generation");
        Ok(())
    }

    fn scope_filter(&self, patient_id: &str) -> Filter {
        match self.scope {
            RotationScope::Global => Filter::all(),
            RotationScope::Patient => Filter::all().eq("patient_id", patient_id),
        }
    }
}
