//! Patient, medical history and flat vitals records
//!
//! Request bodies use the column names of the hosted tables, so rows go
//! to the store as serialized without renaming.

mod service;

pub use service::{next_patient_id, RecordsService, HISTORY_TABLE, PATIENTS_TABLE};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Optional demographic and admission fields shared by create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatientDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admission_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_discharge_date: Option<NaiveDate>,
    #[serde(rename = "Height_cm", skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(rename = "Weight_kg", skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCreate {
    #[serde(rename = "PatientID", default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientUpdate {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MedicalHistoryInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chronic_conditions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub past_surgeries: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_allergies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_history: Option<String>,
}
