use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use surge_core::PricingError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::NotFound(msg) => AppError::NotFoundError(msg),
            e @ PricingError::InvalidBounds { .. } => AppError::ValidationError(e.to_string()),
            e @ (PricingError::Persistence(_) | PricingError::Repository(_)) => {
                AppError::InternalServerError(e.to_string())
            }
        }
    }
}
