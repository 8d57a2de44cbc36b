use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection};

use crate::analysis::{AnalysisService, AnalyzeRequest, AskRequest};
use crate::error::EmrError;
use crate::records::{MedicalHistoryInput, PatientCreate, PatientUpdate, RecordsService};
use crate::vitals::{GraphData, RotationEngine, VitalsAggregator, VitalsInput};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Largest `days` accepted by the vitals listing.
const VITALS_MAX_DAYS: i64 = 30;
const VITALS_DEFAULT_DAYS: i64 = 5;
/// Largest `days` accepted by the chart data.
const GRAPH_MAX_DAYS: i64 = 365;
const GRAPH_DEFAULT_DAYS: i64 = 14;

/// Envelope for errors and message-only replies.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn success(message: &str, data: Option<Value>) -> Self {
        ApiResponse {
            status: "success".to_string(),
            message: message.to_string(),
            data,
        }
    }

    pub fn error(message: String) -> Self {
        ApiResponse {
            status: "error".to_string(),
            message,
            data: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

impl DaysQuery {
    fn resolve(&self, default: i64, max: i64) -> Result<usize, EmrError> {
        let days = self.days.unwrap_or(default);
        if !(1..=max).contains(&days) {
            return Err(EmrError::Validation(format!(
                "days must be between 1 and {}, got {}",
                max, days
            )));
        }
        Ok(days as usize)
    }
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: String,
}

type JsonReply = WithStatus<Json>;

fn error_reply(error: &EmrError) -> JsonReply {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(error = %error, status = status.as_u16(), "request failed");
    } else {
        tracing::debug!(error = %error, status = status.as_u16(), "request rejected");
    }
    warp::reply::with_status(warp::reply::json(&ApiResponse::error(error.to_string())), status)
}

fn respond<T: Serialize>(result: Result<T, EmrError>, success: StatusCode) -> Result<JsonReply, Infallible> {
    Ok(match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), success),
        Err(error) => error_reply(&error),
    })
}

fn with<T: Send + Sync>(service: Arc<T>) -> impl Filter<Extract = (Arc<T>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&service))
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

async fn handle_rejection(rejection: Rejection) -> Result<JsonReply, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid query: {}", e))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length header required".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected a JSON body".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::error!(?rejection, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::error(message)),
        status,
    ))
}

pub struct RestApi {
    records: Arc<RecordsService>,
    rotation: Arc<RotationEngine>,
    aggregator: Arc<VitalsAggregator>,
    analysis: Arc<AnalysisService>,
}

impl RestApi {
    pub fn new(
        records: Arc<RecordsService>,
        rotation: Arc<RotationEngine>,
        aggregator: Arc<VitalsAggregator>,
        analysis: Arc<AnalysisService>,
    ) -> Self {
        RestApi {
            records,
            rotation,
            aggregator,
            analysis,
        }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl warp::Reply, Error = Rejection> + Clone {
        let cors = warp::cors()
            .allow_any_origin()
            .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_headers(vec!["content-type", "authorization"]);

        self.health()
            .or(self.patient_routes())
            .unify()
            .or(self.history_routes())
            .unify()
            .or(self.vitals_routes())
            .unify()
            .or(self.analysis_routes())
            .unify()
            .recover(handle_rejection)
            .with(cors)
    }

    fn health(&self) -> impl Filter<Extract = (JsonReply,), Error = Rejection> + Clone {
        warp::path::end().and(warp::get()).map(|| {
            let response = ApiResponse {
                status: "ok".to_string(),
                message: "Welcome to the vitalsync EMR API".to_string(),
                data: None,
            };
            warp::reply::with_status(warp::reply::json(&response), StatusCode::OK)
        })
    }

    fn patient_routes(&self) -> impl Filter<Extract = (JsonReply,), Error = Rejection> + Clone {
        let create = warp::path!("patients")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.records)))
            .and_then(|patient: PatientCreate, records: Arc<RecordsService>| async move {
                respond(records.create_patient(patient).await, StatusCode::CREATED)
            });

        let list = warp::path!("patients")
            .and(warp::get())
            .and(with(Arc::clone(&self.records)))
            .and_then(|records: Arc<RecordsService>| async move {
                respond(records.list_patients().await, StatusCode::OK)
            });

        let get = warp::path!("patients" / String)
            .and(warp::get())
            .and(with(Arc::clone(&self.records)))
            .and_then(|patient_id: String, records: Arc<RecordsService>| async move {
                respond(records.get_patient(&patient_id).await, StatusCode::OK)
            });

        let update = warp::path!("patients" / String)
            .and(warp::put())
            .and(json_body())
            .and(with(Arc::clone(&self.records)))
            .and_then(
                |patient_id: String, update: PatientUpdate, records: Arc<RecordsService>| async move {
                    respond(records.update_patient(&patient_id, update).await, StatusCode::OK)
                },
            );

        let delete = warp::path!("patients" / String)
            .and(warp::delete())
            .and(with(Arc::clone(&self.records)))
            .and_then(|patient_id: String, records: Arc<RecordsService>| async move {
                respond(records.delete_patient(&patient_id).await, StatusCode::OK)
            });

        create
            .or(list)
            .unify()
            .or(get)
            .unify()
            .or(update)
            .unify()
            .or(delete)
            .unify()
    }

    fn history_routes(&self) -> impl Filter<Extract = (JsonReply,), Error = Rejection> + Clone {
        let upsert = warp::path!("patients" / String / "history")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.records)))
            .and_then(
                |patient_id: String, history: MedicalHistoryInput, records: Arc<RecordsService>| async move {
                    respond(records.upsert_history(&patient_id, history).await, StatusCode::CREATED)
                },
            );

        let get = warp::path!("patients" / String / "history")
            .and(warp::get())
            .and(with(Arc::clone(&self.records)))
            .and_then(|patient_id: String, records: Arc<RecordsService>| async move {
                respond(records.fetch_history(&patient_id).await, StatusCode::OK)
            });

        let delete = warp::path!("patients" / String / "history")
            .and(warp::delete())
            .and(with(Arc::clone(&self.records)))
            .and_then(|patient_id: String, records: Arc<RecordsService>| async move {
                respond(records.delete_history(&patient_id).await, StatusCode::OK)
            });

        upsert.or(get).unify().or(delete).unify()
    }

    fn vitals_routes(&self) -> impl Filter<Extract = (JsonReply,), Error = Rejection> + Clone {
        let shift = warp::path!("patients" / String / "vitals" / "shift")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.rotation)))
            .and_then(
                |patient_id: String, vitals: VitalsInput, rotation: Arc<RotationEngine>| async move {
                    let record = vitals.into_record(&patient_id);
                    let result = rotation
                        .rotate_and_insert(&patient_id, record)
                        .await
                        .map(|row| {
                            ApiResponse::success("Vitals inserted with shift logic", Some(Value::Object(row)))
                        })
                        .map_err(EmrError::from);
                    respond(result, StatusCode::CREATED)
                },
            );

        let add = warp::path!("patients" / String / "vitals")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.records)))
            .and_then(
                |patient_id: String, vitals: VitalsInput, records: Arc<RecordsService>| async move {
                    respond(records.add_vitals(&patient_id, vitals).await, StatusCode::CREATED)
                },
            );

        let recent = warp::path!("patients" / String / "vitals")
            .and(warp::get())
            .and(warp::query::<DaysQuery>())
            .and(with(Arc::clone(&self.aggregator)))
            .and_then(
                |patient_id: String, query: DaysQuery, aggregator: Arc<VitalsAggregator>| async move {
                    let result = match query.resolve(VITALS_DEFAULT_DAYS, VITALS_MAX_DAYS) {
                        Ok(days) => aggregator
                            .fetch_recent(&patient_id, days)
                            .await
                            .map_err(EmrError::from),
                        Err(e) => Err(e),
                    };
                    respond(result, StatusCode::OK)
                },
            );

        let update = warp::path!("patients" / String / "vitals")
            .and(warp::put())
            .and(json_body())
            .and(with(Arc::clone(&self.records)))
            .and_then(
                |patient_id: String, vitals: VitalsInput, records: Arc<RecordsService>| async move {
                    respond(records.update_vitals(&patient_id, vitals).await, StatusCode::OK)
                },
            );

        let delete = warp::path!("patients" / String / "vitals")
            .and(warp::delete())
            .and(warp::query::<DateQuery>())
            .and(with(Arc::clone(&self.records)))
            .and_then(
                |patient_id: String, query: DateQuery, records: Arc<RecordsService>| async move {
                    respond(records.delete_vitals(&patient_id, &query.date).await, StatusCode::OK)
                },
            );

        let graph = warp::path!("patients" / String / "graph-data")
            .and(warp::get())
            .and(warp::query::<DaysQuery>())
            .and(with(Arc::clone(&self.aggregator)))
            .and_then(
                |patient_id: String, query: DaysQuery, aggregator: Arc<VitalsAggregator>| async move {
                    let result = match query.resolve(GRAPH_DEFAULT_DAYS, GRAPH_MAX_DAYS) {
                        Ok(days) => aggregator
                            .fetch_recent(&patient_id, days)
                            .await
                            .map(|records| GraphData::from_records(&records))
                            .map_err(EmrError::from),
                        Err(e) => Err(e),
                    };
                    respond(result, StatusCode::OK)
                },
            );

        shift
            .or(add)
            .unify()
            .or(recent)
            .unify()
            .or(update)
            .unify()
            .or(delete)
            .unify()
            .or(graph)
            .unify()
    }

    fn analysis_routes(&self) -> impl Filter<Extract = (JsonReply,), Error = Rejection> + Clone {
        let analyze = warp::path!("patients" / String / "analyze")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.analysis)))
            .and_then(
                |patient_id: String, request: AnalyzeRequest, analysis: Arc<AnalysisService>| async move {
                    let question = request.question.as_deref();
                    respond(analysis.analyze(&patient_id, question).await, StatusCode::OK)
                },
            );

        let ask = warp::path!("patients" / String / "ask")
            .and(warp::post())
            .and(json_body())
            .and(with(Arc::clone(&self.analysis)))
            .and_then(
                |patient_id: String, request: AskRequest, analysis: Arc<AnalysisService>| async move {
                    respond(analysis.ask(&patient_id, &request.question).await, StatusCode::OK)
                },
            );

        analyze.or(ask).unify()
    }
}
