use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use companies_core::ServiceError;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::Service(err) => {
                let status = match &err {
                    ServiceError::Validation(_) | ServiceError::Store(_) => StatusCode::BAD_REQUEST,
                    ServiceError::Conflict(_) => StatusCode::CONFLICT,
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                };
                (status, err.code(), err.to_string())
            }
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message),
            Self::Internal(message) => {
                error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    message,
                )
            }
        };

        let body = ApiErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
