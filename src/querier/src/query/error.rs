use axum::{http::StatusCode, response::IntoResponse};
use common::storage::StorageError;

use super::promql::PromQLError;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("malformed query request: {0}")]
    Malformed(String),
    #[error("invalid time range: mint {mint} is after maxt {maxt}")]
    InvalidTimeRange { mint: i64, maxt: i64 },
    #[error(transparent)]
    Translate(#[from] PromQLError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Malformed(_) | Self::InvalidTimeRange { .. } | Self::Translate(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Storage(StorageError::Closed) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
