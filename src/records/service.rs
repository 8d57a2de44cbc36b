use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::{MedicalHistoryInput, PatientCreate, PatientUpdate};
use crate::error::EmrError;
use crate::storage::{Filter, RecordStore, Row, StorageError};
use crate::vitals::{VitalsAggregator, VitalsInput};

pub const PATIENTS_TABLE: &str = "patients";
pub const HISTORY_TABLE: &str = "patient_medical_history";

const PATIENT_KEY: &str = "PatientID";
const VITALS_PATIENT_KEY: &str = "patient_id";

/// Vitals included with a patient lookup.
const PATIENT_VITALS_DAYS: usize = 5;

pub struct RecordsService {
    store: Arc<dyn RecordStore>,
    aggregator: Arc<VitalsAggregator>,
    flat_table: String,
}

fn to_row<T: Serialize>(value: &T) -> Result<Row, EmrError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StorageError::Decode(format!("expected an object, got {}", other)).into()),
        Err(e) => Err(StorageError::Decode(e.to_string()).into()),
    }
}

fn message(text: &str) -> Value {
    json!({ "message": text })
}

/// Next `PID-NNN` identifier: one past the largest trailing number among
/// `ids`, or `PID-001` when none has one.
pub fn next_patient_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let highest = ids
        .into_iter()
        .filter_map(|id| {
            let prefix = id.trim_end_matches(|c: char| c.is_ascii_digit());
            id[prefix.len()..].parse::<u64>().ok()
        })
        .max();
    format!("PID-{:03}", highest.map_or(1, |n| n.saturating_add(1)))
}

impl RecordsService {
    pub fn new(store: Arc<dyn RecordStore>, aggregator: Arc<VitalsAggregator>, flat_table: &str) -> Self {
        RecordsService {
            store,
            aggregator,
            flat_table: flat_table.to_string(),
        }
    }

    fn patient_filter(patient_id: &str) -> Filter {
        Filter::all().eq(PATIENT_KEY, patient_id)
    }

    pub async fn create_patient(&self, patient: PatientCreate) -> Result<Row, EmrError> {
        let mut row = to_row(&patient)?;
        if patient.patient_id.as_deref().map_or(true, str::is_empty) {
            let existing = self.store.select(PATIENTS_TABLE, &Filter::all()).await?;
            let id = next_patient_id(
                existing
                    .iter()
                    .filter_map(|row| row.get(PATIENT_KEY).and_then(Value::as_str)),
            );
            row.insert(PATIENT_KEY.to_string(), Value::from(id));
        }

        let stored = self.store.insert(PATIENTS_TABLE, row).await?;
        tracing::info!(patient_id = ?stored.get(PATIENT_KEY), "created patient");
        Ok(stored)
    }

    pub async fn list_patients(&self) -> Result<Vec<Row>, EmrError> {
        Ok(self.store.select(PATIENTS_TABLE, &Filter::all()).await?)
    }

    pub async fn fetch_patient(&self, patient_id: &str) -> Result<Row, EmrError> {
        self.store
            .select(PATIENTS_TABLE, &Self::patient_filter(patient_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrError::NotFound("Patient not found".to_string()))
    }

    /// The patient's history row, or an empty row when none was recorded.
    pub async fn fetch_history(&self, patient_id: &str) -> Result<Row, EmrError> {
        Ok(self
            .store
            .select(HISTORY_TABLE, &Self::patient_filter(patient_id))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Patient row with its history and most recent vitals attached.
    pub async fn get_patient(&self, patient_id: &str) -> Result<Row, EmrError> {
        let mut patient = self.fetch_patient(patient_id).await?;
        let history = self.fetch_history(patient_id).await?;
        let vitals = self
            .aggregator
            .fetch_recent(patient_id, PATIENT_VITALS_DAYS)
            .await?;

        patient.insert("medical_history".to_string(), Value::Object(history));
        patient.insert("recent_vitals".to_string(), json!(vitals));
        Ok(patient)
    }

    pub async fn update_patient(&self, patient_id: &str, update: PatientUpdate) -> Result<Row, EmrError> {
        let changes = to_row(&update)?;
        if changes.is_empty() {
            return Err(EmrError::Validation("No fields to update".to_string()));
        }

        self.store
            .update(PATIENTS_TABLE, &Self::patient_filter(patient_id), changes)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrError::NotFound("Patient not found".to_string()))
    }

    pub async fn delete_patient(&self, patient_id: &str) -> Result<Value, EmrError> {
        self.store
            .delete(PATIENTS_TABLE, &Self::patient_filter(patient_id))
            .await?;
        tracing::info!(patient_id, "deleted patient");
        Ok(message("Patient deleted"))
    }

    /// Insert the history row, or update it when one already exists.
    pub async fn upsert_history(&self, patient_id: &str, history: MedicalHistoryInput) -> Result<Row, EmrError> {
        let mut row = to_row(&history)?;
        row.insert(PATIENT_KEY.to_string(), Value::from(patient_id));
        let filter = Self::patient_filter(patient_id);

        let existing = self.store.select(HISTORY_TABLE, &filter).await?;
        if existing.is_empty() {
            return Ok(self.store.insert(HISTORY_TABLE, row).await?);
        }

        self.store
            .update(HISTORY_TABLE, &filter, row)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrError::NotFound("Medical history not found".to_string()))
    }

    pub async fn delete_history(&self, patient_id: &str) -> Result<Value, EmrError> {
        self.store
            .delete(HISTORY_TABLE, &Self::patient_filter(patient_id))
            .await?;
        Ok(message("Medical history deleted"))
    }

    /// Append a vitals row to the flat table, bypassing rotation.
    pub async fn add_vitals(&self, patient_id: &str, vitals: VitalsInput) -> Result<Row, EmrError> {
        let record = vitals.into_record(patient_id);
        Ok(self.store.insert(&self.flat_table, record.to_row()).await?)
    }

    /// Replace the flat-table row for `patient_id` on the input's date.
    pub async fn update_vitals(&self, patient_id: &str, vitals: VitalsInput) -> Result<Row, EmrError> {
        let record = vitals.into_record(patient_id);
        let filter = Filter::all()
            .eq(VITALS_PATIENT_KEY, patient_id)
            .eq("date", record.date.as_str());

        self.store
            .update(&self.flat_table, &filter, record.to_row())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmrError::NotFound("Vitals row not found".to_string()))
    }

    pub async fn delete_vitals(&self, patient_id: &str, date: &str) -> Result<Value, EmrError> {
        let filter = Filter::all()
            .eq(VITALS_PATIENT_KEY, patient_id)
            .eq("date", date);

        let removed = self.store.delete(&self.flat_table, &filter).await?;
        if removed.is_empty() {
            return Err(EmrError::NotFound("Vitals row not found".to_string()));
        }
        Ok(message("Vitals deleted"))
    }
}
