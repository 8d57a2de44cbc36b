use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use warp::http::StatusCode;

use vitalsync::analysis::{AnalysisError, LlmProvider};
use vitalsync::api::{self, RestApi};
use vitalsync::records::{HISTORY_TABLE, PATIENTS_TABLE};
use vitalsync::storage::MemoryStore;
use vitalsync::vitals::{RotationScope, VitalsLayout};

const FLAT: &str = "patient_vitals_timeseries";

struct CannedLlm;

#[async_trait]
impl LlmProvider for CannedLlm {
    async fn complete(&self, prompt: &str) -> Result<Value, AnalysisError> {
        Ok(json!({ "summary": "stable", "prompt_chars": prompt.len() }))
    }
    fn name(&self) -> &str {
        "canned"
    }
}

struct DownLlm;

#[async_trait]
impl LlmProvider for DownLlm {
    async fn complete(&self, _prompt: &str) -> Result<Value, AnalysisError> {
        Err(AnalysisError::Unavailable("connection refused".to_string()))
    }
    fn name(&self) -> &str {
        "down"
    }
}

fn store(with_slots: bool) -> Arc<MemoryStore> {
    let mut tables = vec![PATIENTS_TABLE.to_string(), HISTORY_TABLE.to_string(), FLAT.to_string()];
    if with_slots {
        tables.extend((1..=5).map(|slot| format!("vitals_day_{}", slot)));
    }
    Arc::new(MemoryStore::with_tables(tables))
}

fn rotation_api(provider: Arc<dyn LlmProvider>) -> RestApi {
    api::assemble(
        store(true),
        VitalsLayout::rotation(5, "vitals_day_", FLAT),
        RotationScope::Patient,
        provider,
    )
}

fn vitals_body(date: &str, heart_rate: i64) -> Value {
    json!({
        "date": date,
        "heartRate": heart_rate,
        "bodyTemperature": 36.9,
        "respiratoryRate": 16,
        "bloodPressure": "120/80",
        "bloodGlucose": 98
    })
}

async fn send(api: &RestApi, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = warp::test::request().method(method).path(path);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.reply(&api.routes()).await;
    let status = response.status();
    let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (status, body)
}

async fn create_patient(api: &RestApi, name: &str) -> String {
    let (status, body) = send(api, "POST", "/patients", Some(json!({ "Name": name, "Age": 50 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["PatientID"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let api = rotation_api(Arc::new(CannedLlm));
    let (status, body) = send(&api, "GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn test_patient_lifecycle() {
    let api = rotation_api(Arc::new(CannedLlm));

    let id = create_patient(&api, "John Smith").await;
    assert_eq!(id, "PID-001");
    assert_eq!(create_patient(&api, "Sarah Johnson").await, "PID-002");

    let (status, list) = send(&api, "GET", "/patients", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);

    let (status, updated) = send(&api, "PUT", "/patients/PID-001", Some(json!({"Condition": "Stable"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["Condition"], json!("Stable"));

    let (status, patient) = send(&api, "GET", "/patients/PID-001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patient["Name"], json!("John Smith"));
    assert_eq!(patient["medical_history"], json!({}));
    assert_eq!(patient["recent_vitals"], json!([]));

    let (status, body) = send(&api, "DELETE", "/patients/PID-001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Patient deleted"}));

    let (status, body) = send(&api, "GET", "/patients/PID-001", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], json!("error"));
    assert_eq!(body["message"], json!("Patient not found"));
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let api = rotation_api(Arc::new(CannedLlm));

    let (status, body) = send(&api, "POST", "/patients", Some(json!({"Age": 3}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("error"));

    let (status, _) = send(
        &api,
        "POST",
        "/patients/PID-001/vitals/shift",
        Some(json!({"date": "not-a-date", "heartRate": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_upsert_and_delete() {
    let api = rotation_api(Arc::new(CannedLlm));
    let id = create_patient(&api, "John").await;
    let path = format!("/patients/{}/history", id);

    let (status, _) = send(&api, "POST", &path, Some(json!({"KnownAllergies": "Penicillin"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, history) = send(&api, "POST", &path, Some(json!({"PastSurgeries": "Appendectomy"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(history["KnownAllergies"], json!("Penicillin"));
    assert_eq!(history["PastSurgeries"], json!("Appendectomy"));

    let (_, history) = send(&api, "GET", &path, None).await;
    assert_eq!(history["PatientID"], json!(id));

    send(&api, "DELETE", &path, None).await;
    let (status, history) = send(&api, "GET", &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!({}));
}

#[tokio::test]
async fn test_shift_then_read_window() {
    let api = rotation_api(Arc::new(CannedLlm));

    for day in 1..=6 {
        let (status, body) = send(
            &api,
            "POST",
            "/patients/PID-001/vitals/shift",
            Some(vitals_body(&format!("2024-01-0{}", day), 60 + day)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], json!("Vitals inserted with shift logic"));
    }

    let (status, vitals) = send(&api, "GET", "/patients/PID-001/vitals?days=30", None).await;
    assert_eq!(status, StatusCode::OK);
    let dates: Vec<&str> = vitals
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2024-01-02", "2024-01-03", "2024-01-04", "2024-01-05", "2024-01-06"]);

    let (_, latest) = send(&api, "GET", "/patients/PID-001/vitals?days=1", None).await;
    assert_eq!(latest[0]["heartRate"], json!(66));
    assert_eq!(latest.as_array().unwrap().len(), 1);

    let (_, default_window) = send(&api, "GET", "/patients/PID-001/vitals", None).await;
    assert_eq!(default_window.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_days_out_of_range() {
    let api = rotation_api(Arc::new(CannedLlm));

    let (status, _) = send(&api, "GET", "/patients/PID-001/vitals?days=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&api, "GET", "/patients/PID-001/vitals?days=31", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&api, "GET", "/patients/PID-001/graph-data?days=366", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&api, "GET", "/patients/PID-001/vitals?days=many", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_graph_data_splits_blood_pressure() {
    let api = rotation_api(Arc::new(CannedLlm));
    let mut odd = vitals_body("2024-01-02", 72);
    odd["bloodPressure"] = json!("n/a");

    send(&api, "POST", "/patients/PID-001/vitals/shift", Some(vitals_body("2024-01-01", 70))).await;
    send(&api, "POST", "/patients/PID-001/vitals/shift", Some(odd)).await;

    let (status, graph) = send(&api, "GET", "/patients/PID-001/graph-data?days=14", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        graph,
        json!({
            "dates": ["2024-01-01", "2024-01-02"],
            "heartRate": [70, 72],
            "temperature": [36.9, 36.9],
            "systolic": [120, null],
            "diastolic": [80, null],
            "glucose": [98, 98]
        })
    );
}

#[tokio::test]
async fn test_flat_layout_end_to_end() {
    let store = store(false);
    let api = api::assemble(
        store.clone(),
        VitalsLayout::flat(5, "vitals_day_", FLAT),
        RotationScope::Patient,
        Arc::new(CannedLlm),
    );

    send(&api, "POST", "/patients/PID-001/vitals/shift", Some(vitals_body("2024-01-02", 71))).await;
    let (status, _) = send(&api, "POST", "/patients/PID-001/vitals", Some(vitals_body("2024-01-01", 70))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(store.row_count(FLAT).await, 2);

    let (_, vitals) = send(&api, "GET", "/patients/PID-001/vitals?days=5", None).await;
    let rates: Vec<i64> = vitals
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["heartRate"].as_i64().unwrap())
        .collect();
    assert_eq!(rates, vec![70, 71]);

    let (status, updated) = send(&api, "PUT", "/patients/PID-001/vitals", Some(vitals_body("2024-01-01", 80))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["heart_rate"], json!(80));

    let (status, _) = send(&api, "DELETE", "/patients/PID-001/vitals?date=2024-01-01", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&api, "DELETE", "/patients/PID-001/vitals?date=2024-01-01", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("Vitals row not found"));
}

#[tokio::test]
async fn test_analyze_and_ask() {
    let api = rotation_api(Arc::new(CannedLlm));
    let id = create_patient(&api, "John").await;
    let analyze = format!("/patients/{}/analyze", id);

    let (status, body) = send(&api, "POST", &analyze, Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("No vitals found for patient in any day table"));

    send(
        &api,
        "POST",
        &format!("/patients/{}/vitals/shift", id),
        Some(vitals_body("2024-01-01", 70)),
    )
    .await;

    let (status, body) = send(&api, "POST", &analyze, Some(json!({"question": "Trend?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["patient_id"], json!(id));
    assert_eq!(body["llm_analysis"]["summary"], json!("stable"));
    assert_eq!(body["recent_vitals"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &api,
        "POST",
        &format!("/patients/{}/ask", id),
        Some(json!({"question": "Allergies?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["llm_analysis"]["summary"], json!("stable"));
}

#[tokio::test]
async fn test_unreachable_model_is_service_unavailable() {
    let api = rotation_api(Arc::new(DownLlm));
    let id = create_patient(&api, "John").await;

    let (status, body) = send(
        &api,
        "POST",
        &format!("/patients/{}/ask", id),
        Some(json!({"question": "Stable?"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], json!("connection refused"));
}

#[tokio::test]
async fn test_unknown_route() {
    let api = rotation_api(Arc::new(CannedLlm));
    let (status, _) = send(&api, "GET", "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
