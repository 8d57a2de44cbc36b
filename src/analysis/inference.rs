//! Hosted text-generation endpoint (Hugging Face Inference API shape).

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{AnalysisError, LlmProvider};
use crate::config::InferenceConfig;

static JSON_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON span pattern is valid"));

pub struct HuggingFaceProvider {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    max_new_tokens: u32,
}

impl HuggingFaceProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HuggingFaceProvider {
            client,
            endpoint: format!("{}/{}", config.url.trim_end_matches('/'), config.model),
            token: config.token.clone(),
            max_new_tokens: config.max_new_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "inputs": prompt,
            "parameters": { "max_new_tokens": self.max_new_tokens }
        })
    }
}

/// Turn the endpoint's response into the analysis object. The model is
/// asked for JSON; the first `{...}` span of the generated text is parsed
/// and anything else is passed back raw.
pub fn parse_generation(body: Value) -> Value {
    let generated = body
        .as_array()
        .and_then(|items| items.first())
        .and_then(|first| first.get("generated_text"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(text) = generated else {
        return json!({ "raw_response": body });
    };

    match JSON_SPAN_RE.find(&text) {
        Some(span) => match serde_json::from_str::<Value>(span.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "generated text held malformed JSON");
                json!({ "raw_text": text, "error": "Failed to parse JSON." })
            }
        },
        None => json!({ "raw_text": text }),
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    async fn complete(&self, prompt: &str) -> Result<Value, AnalysisError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| AnalysisError::Config("HF_TOKEN not configured for inference API".to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "inference request failed");
                AnalysisError::Unavailable(format!("Inference API request failed: {}", e))
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "inference API error");
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        Ok(parse_generation(body))
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}
