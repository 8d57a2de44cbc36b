//! Patient analysis through a hosted language model
//!
//! Assembles the patient's record, history and recent vitals into a
//! prompt and returns the model's structured answer.

pub mod inference;
pub mod prompt;

pub use inference::HuggingFaceProvider;
pub use prompt::build_prompt;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EmrError;
use crate::records::RecordsService;
use crate::vitals::VitalsAggregator;

/// Vitals window fed to the model.
const ANALYSIS_DAYS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Inference API returned {status}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Unavailable(e.to_string())
    }
}

/// A model that answers a prompt with a JSON object.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Value, AnalysisError>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

pub struct AnalysisService {
    records: Arc<RecordsService>,
    aggregator: Arc<VitalsAggregator>,
    provider: Arc<dyn LlmProvider>,
}

impl AnalysisService {
    pub fn new(
        records: Arc<RecordsService>,
        aggregator: Arc<VitalsAggregator>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        AnalysisService {
            records,
            aggregator,
            provider,
        }
    }

    /// Full analysis. Requires at least one vitals record.
    pub async fn analyze(&self, patient_id: &str, question: Option<&str>) -> Result<Value, EmrError> {
        let patient = self.records.fetch_patient(patient_id).await?;
        let history = self.records.fetch_history(patient_id).await?;
        let vitals = self.aggregator.fetch_recent(patient_id, ANALYSIS_DAYS).await?;
        if vitals.is_empty() {
            return Err(EmrError::NotFound(
                "No vitals found for patient in any day table".to_string(),
            ));
        }

        let prompt = build_prompt(&patient, &history, &vitals, question);
        tracing::info!(patient_id, provider = self.provider.name(), "requesting analysis");
        let analysis = self.provider.complete(&prompt).await?;

        Ok(json!({
            "patient_id": patient_id,
            "medical_history": history,
            "recent_vitals": vitals,
            "llm_analysis": analysis,
        }))
    }

    /// Answer a clinician's question about the patient.
    pub async fn ask(&self, patient_id: &str, question: &str) -> Result<Value, EmrError> {
        let patient = self.records.fetch_patient(patient_id).await?;
        let history = self.records.fetch_history(patient_id).await?;
        let vitals = self.aggregator.fetch_recent(patient_id, ANALYSIS_DAYS).await?;

        let prompt = build_prompt(&patient, &history, &vitals, Some(question));
        tracing::info!(patient_id, provider = self.provider.name(), "answering question");
        let analysis = self.provider.complete(&prompt).await?;

        Ok(json!({
            "patient_id": patient_id,
            "llm_analysis": analysis,
        }))
    }
}
