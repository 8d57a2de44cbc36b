use serde_json::Value;

use crate::storage::Row;
use crate::vitals::VitalsRecord;

const NOT_AVAILABLE: &str = "N/A";

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn text_or_na(row: &Row, key: &str) -> String {
    text(row, key).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Clinical summary prompt for one patient.
pub fn build_prompt(patient: &Row, history: &Row, vitals: &[VitalsRecord], question: Option<&str>) -> String {
    let mut lines = vec![
        format!(
            "Patient: {} (ID {})",
            text_or_na(patient, "Name"),
            text_or_na(patient, "PatientID")
        ),
        text(patient, "Age")
            .map(|age| format!("Age: {}, Sex: {}", age, text_or_na(patient, "Sex")))
            .unwrap_or_default(),
        "\nMedical History:".to_string(),
        format!("- Chronic conditions: {}", text_or_na(history, "ChronicConditions")),
        format!("- Past surgeries: {}", text_or_na(history, "PastSurgeries")),
        format!("- Allergies: {}", text_or_na(history, "KnownAllergies")),
        format!("- Family history: {}", text_or_na(history, "FamilyHistory")),
        "\nRecent Vitals (most recent first):".to_string(),
    ];

    for vital in vitals {
        lines.push(format!(
            "- {}: HR={}, Temp={}°C, RR={}, BP={}, Glucose={} mg/dL",
            vital.date,
            vital.heart_rate,
            vital.body_temperature,
            vital.respiratory_rate,
            if vital.blood_pressure.is_empty() {
                NOT_AVAILABLE
            } else {
                vital.blood_pressure.as_str()
            },
            vital.blood_glucose
        ));
    }

    lines.extend(
        [
            "\nTasks:",
            "1. Summarize the patient's current condition.",
            "2. Predict the patient's vitals for the next 24 hours.",
            "3. State whether the patient's overall trend is Improving, Stable, or Deteriorating.",
            "4. Provide a brief explanation for the trend assessment.",
        ]
        .map(String::from),
    );
    if let Some(question) = question.filter(|q| !q.is_empty()) {
        lines.push(format!("5. Answer the clinician's question: {}", question));
    }
    lines.push(
        "\nReturn response as JSON with keys: 'summary', 'predicted_vitals', 'trend', 'explanation', 'answer_to_question'."
            .to_string(),
    );

    lines
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
