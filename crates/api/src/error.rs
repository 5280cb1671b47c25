//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request the domain never saw.
    #[error("{0}")]
    BadRequest(String),

    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => match err {
                DomainError::Validation(_) | DomainError::Authentication(_) => {
                    StatusCode::BAD_REQUEST
                }
                DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
                DomainError::InvalidTransition { .. }
                | DomainError::InvalidState(_)
                | DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
                DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            if status.is_server_error() {
                tracing::warn!(error = %self, "upstream failure");
            }
            self.to_string()
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
