use axum::{http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::models::{RepositoryError, ServiceError};

pub type ApiError = (StatusCode, Json<Value>);

/// Convert service errors to HTTP responses.
///
/// Persistence failures are reported without internal detail; validation
/// failures name the offending field when there is one.
pub fn service_error_to_response(err: ServiceError) -> ApiError {
    let mut field = None;

    let (status, message) = match err {
        ServiceError::PetNotFound { .. } | ServiceError::PetNameNotFound { .. } => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        ServiceError::Forbidden { .. } => (
            StatusCode::FORBIDDEN,
            "You do not have permission to modify this pet".to_string(),
        ),
        ServiceError::Validation { ref source } => {
            field = source.field().map(str::to_string);
            (StatusCode::BAD_REQUEST, source.to_string())
        }
        ServiceError::Repository { source } => match source {
            RepositoryError::NotFound | RepositoryError::ConditionFailed => {
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            RepositoryError::ConnectionFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Database connection failed".to_string(),
            ),
            RepositoryError::Timeout => {
                (StatusCode::REQUEST_TIMEOUT, "Request timeout".to_string())
            }
            RepositoryError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        },
        ServiceError::Configuration { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Configuration error".to_string(),
        ),
    };

    let mut body = json!({
        "error": message,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if let Some(field) = field {
        body["field"] = Value::String(field);
    }

    (status, Json(body))
}
