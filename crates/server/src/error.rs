use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bangumi_catalog::FetchError;
use bangumi_core::error::{ApiError, ErrorEnvelope};
use tracing::{debug, warn};

/// Handler error rendered as the JSON error envelope.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed upstream");
        } else {
            debug!(code = self.0.code(), error = %self.0, "request rejected");
        }
        (status, Json(ErrorEnvelope::from(&self.0))).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        Self(ApiError::BadGateway(e.to_string()))
    }
}
