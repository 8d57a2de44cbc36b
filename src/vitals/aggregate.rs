use std::sync::Arc;

use super::{decode_rows, sort_by_date, VitalsLayout, VitalsRecord};
use crate::storage::{Filter, RecordStore, StorageError};

/// Read path over the vitals tables.
pub struct VitalsAggregator {
    store: Arc<dyn RecordStore>,
    layout: Arc<VitalsLayout>,
}

impl VitalsAggregator {
    pub fn new(store: Arc<dyn RecordStore>, layout: Arc<VitalsLayout>) -> Self {
        VitalsAggregator { store, layout }
    }

    /// Up to `days` records for `patient_id`, oldest first.
    ///
    /// With slot tables, only the `min(days, N)` newest generations are
    /// read (slots `1..=min(days, N)` when every slot is present) and the
    /// oldest `days` of what they hold are returned. With the flat table,
    /// the most recent `days` records are returned. When a date does not
    /// parse the records stay in the order they were read.
    pub async fn fetch_recent(&self, patient_id: &str, days: usize) -> Result<Vec<VitalsRecord>, StorageError> {
        let filter = Filter::all().eq("patient_id", patient_id);

        if self.layout.is_flat() {
            let table = self.layout.flat_table();
            let rows = self.store.select(table, &filter).await?;
            let mut records = decode_rows(table, rows);
            sort_by_date(&mut records);
            let skip = records.len().saturating_sub(days);
            return Ok(records.split_off(skip));
        }

        let mut records = Vec::new();
        for slot in self.layout.slots().take(days) {
            let table = self.layout.slot_table(slot);
            let rows = self.store.select(&table, &filter).await?;
            records.extend(decode_rows(&table, rows));
        }

        sort_by_date(&mut records);
        records.truncate(days);
        Ok(records)
    }
}
