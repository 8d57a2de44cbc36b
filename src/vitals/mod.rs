//! Vitals time-series
//!
//! Vitals live either in a set of generation-indexed slot tables
//! (`vitals_day_1` .. `vitals_day_N`, slot 1 newest) or in one flat
//! chronological table. This module covers:
//! - the record shape and its stored row form
//! - resolving which layout is provisioned
//! - rotation on insert ([`rotation`])
//! - the bounded read path ([`aggregate`]) and chart reshaping ([`graph`])

pub mod aggregate;
pub mod graph;
pub mod rotation;

pub use aggregate::VitalsAggregator;
pub use graph::{parse_blood_pressure, BloodPressure, GraphData};
pub use rotation::RotationEngine;

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::VitalsConfig;
use crate::storage::{RecordStore, Row, StorageError};

/// One observation for one patient on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsRecord {
    pub patient_id: String,
    pub date: String,
    pub heart_rate: i64,
    pub body_temperature: f64,
    pub respiratory_rate: i64,
    pub blood_pressure: String,
    pub blood_glucose: i64,
}

/// Request body for recording vitals. The patient comes from the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsInput {
    pub date: NaiveDate,
    pub heart_rate: i64,
    pub body_temperature: f64,
    pub respiratory_rate: i64,
    pub blood_pressure: String,
    pub blood_glucose: i64,
}

impl VitalsInput {
    pub fn into_record(self, patient_id: &str) -> VitalsRecord {
        VitalsRecord {
            patient_id: patient_id.to_string(),
            date: self.date.format("%Y-%m-%d").to_string(),
            heart_rate: self.heart_rate,
            body_temperature: self.body_temperature,
            respiratory_rate: self.respiratory_rate,
            blood_pressure: self.blood_pressure,
            blood_glucose: self.blood_glucose,
        }
    }
}

// Column layout of the vitals tables.
#[derive(Debug, Serialize, Deserialize)]
struct StoredVitals {
    patient_id: String,
    date: String,
    heart_rate: i64,
    body_temperature: f64,
    respiratory_rate: i64,
    blood_pressure: String,
    blood_glucose: i64,
}

impl VitalsRecord {
    pub fn to_row(&self) -> Row {
        let stored = StoredVitals {
            patient_id: self.patient_id.clone(),
            date: self.date.clone(),
            heart_rate: self.heart_rate,
            body_temperature: self.body_temperature,
            respiratory_rate: self.respiratory_rate,
            blood_pressure: self.blood_pressure.clone(),
            blood_glucose: self.blood_glucose,
        };
        match serde_json::to_value(stored) {
            Ok(serde_json::Value::Object(row)) => row,
            _ => Row::new(),
        }
    }

    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        let stored: StoredVitals = serde_json::from_value(serde_json::Value::Object(row.clone()))
            .map_err(|e| StorageError::Decode(format!("vitals row: {}", e)))?;
        Ok(VitalsRecord {
            patient_id: stored.patient_id,
            date: stored.date,
            heart_rate: stored.heart_rate,
            body_temperature: stored.body_temperature,
            respiratory_rate: stored.respiratory_rate,
            blood_pressure: stored.blood_pressure,
            blood_glucose: stored.blood_glucose,
        })
    }
}

/// Decode rows, dropping (and logging) any that do not have the vitals shape.
pub(crate) fn decode_rows(table: &str, rows: Vec<Row>) -> Vec<VitalsRecord> {
    rows.iter()
        .filter_map(|row| match VitalsRecord::from_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping malformed vitals row");
                None
            }
        })
        .collect()
}

/// Parse a stored vitals date. Accepts a calendar date, a naive
/// timestamp, or RFC 3339.
pub fn parse_vitals_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(timestamp);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.naive_utc())
}

/// Sort ascending by parsed date. Leaves `records` untouched and returns
/// false when any date does not parse.
pub fn sort_by_date(records: &mut Vec<VitalsRecord>) -> bool {
    let keys: Option<Vec<NaiveDateTime>> = records
        .iter()
        .map(|record| parse_vitals_date(&record.date))
        .collect();

    match keys {
        Some(keys) => {
            let mut keyed: Vec<(NaiveDateTime, VitalsRecord)> =
                keys.into_iter().zip(records.drain(..)).collect();
            keyed.sort_by_key(|(key, _)| *key);
            records.extend(keyed.into_iter().map(|(_, record)| record));
            true
        }
        None => {
            tracing::warn!("unparsable vitals date, keeping accumulation order");
            false
        }
    }
}

/// How the vitals layout is chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Probe the store once for slot tables.
    Auto,
    Rotation,
    Flat,
}

/// Which rows a rotation shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationScope {
    /// Every patient's rows move on every insert (one shared buffer).
    Global,
    /// Only the inserting patient's rows move.
    Patient,
}

/// The resolved vitals storage layout.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalsLayout {
    depth: usize,
    slot_prefix: String,
    flat_table: String,
    provisioned: BTreeSet<usize>,
}

impl VitalsLayout {
    /// All `depth` slot tables provisioned.
    pub fn rotation(depth: usize, slot_prefix: &str, flat_table: &str) -> Self {
        VitalsLayout {
            depth,
            slot_prefix: slot_prefix.to_string(),
            flat_table: flat_table.to_string(),
            provisioned: (1..=depth).collect(),
        }
    }

    /// No slot tables; everything goes through the flat table.
    pub fn flat(depth: usize, slot_prefix: &str, flat_table: &str) -> Self {
        VitalsLayout {
            provisioned: BTreeSet::new(),
            ..VitalsLayout::rotation(depth, slot_prefix, flat_table)
        }
    }

    /// Resolve the layout once. `Auto` probes every slot table and keeps
    /// the ones that exist.
    pub async fn resolve(config: &VitalsConfig, store: &dyn RecordStore) -> Self {
        let layout = match config.layout {
            LayoutMode::Rotation => {
                VitalsLayout::rotation(config.depth, &config.slot_prefix, &config.flat_table)
            }
            LayoutMode::Flat => VitalsLayout::flat(config.depth, &config.slot_prefix, &config.flat_table),
            LayoutMode::Auto => {
                let mut layout =
                    VitalsLayout::flat(config.depth, &config.slot_prefix, &config.flat_table);
                for slot in 1..=config.depth {
                    if store.table_exists(&layout.slot_table(slot)).await {
                        layout.provisioned.insert(slot);
                    }
                }
                // Inserts land in slot 1, so without it the slots are unreachable.
                if !layout.provisioned.is_empty() && !layout.is_provisioned(1) {
                    tracing::warn!(
                        slots = ?layout.provisioned,
                        "slot 1 is not provisioned, using the flat table"
                    );
                    layout.provisioned.clear();
                }
                layout
            }
        };
        tracing::info!(
            depth = layout.depth,
            slots = ?layout.provisioned,
            flat = layout.is_flat(),
            "resolved vitals layout"
        );
        layout
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn flat_table(&self) -> &str {
        &self.flat_table
    }

    pub fn slot_table(&self, slot: usize) -> String {
        format!("{}{}", self.slot_prefix, slot)
    }

    pub fn is_provisioned(&self, slot: usize) -> bool {
        self.provisioned.contains(&slot)
    }

    /// Provisioned slots, newest generation first. Generations occupy
    /// these slots in order, so a missing slot table is stepped over.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.provisioned.iter().copied()
    }

    pub fn is_flat(&self) -> bool {
        self.provisioned.is_empty()
    }
}
