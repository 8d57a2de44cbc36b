use warp::http::StatusCode;

use crate::analysis::AnalysisError;
use crate::config::ConfigError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EmrError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EmrError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EmrError::NotFound(_) => StatusCode::NOT_FOUND,
            EmrError::Validation(_) => StatusCode::BAD_REQUEST,
            EmrError::Storage(_) => StatusCode::BAD_GATEWAY,
            EmrError::Analysis(AnalysisError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            EmrError::Analysis(AnalysisError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            EmrError::Analysis(AnalysisError::Status { status, .. }) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            EmrError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
