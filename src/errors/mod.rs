//! Error handling module for the drone catalog backend.
//!
//! Provides centralized error types with mapping to HTTP status codes and response envelopes.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Client-facing message for every 5xx response.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Field name to message, as collected by the validator.
pub type FieldErrors = BTreeMap<String, String>;

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request body or parameters
    BadRequest(String),
    /// One or more fields failed validation
    FailedValidation(FieldErrors),
    /// Resource not found
    NotFound,
    /// Optimistic concurrency conflict
    EditConflict,
    /// Route exists but not for this method
    MethodNotAllowed(String),
    /// Bearer token malformed, unknown or expired
    InvalidToken,
    /// Anonymous request to a protected route
    AuthenticationRequired,
    /// Authenticated but lacking the permission
    NotPermitted,
    /// Too many requests from one client
    RateLimited,
    /// Store operation exceeded its deadline
    Timeout,
    /// Database error
    Database(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InvalidToken | AppError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Timeout | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the client-facing error message.
    ///
    /// Server-side failures never expose their internal detail.
    pub fn message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::FailedValidation(_) => "one or more fields failed validation".to_string(),
            AppError::NotFound => "the requested resource could not be found".to_string(),
            AppError::EditConflict => {
                "unable to update the record due to an edit conflict, please try again".to_string()
            }
            AppError::MethodNotAllowed(method) => {
                format!("the {} method is not supported for this resource", method)
            }
            AppError::InvalidToken => "invalid or missing authentication token".to_string(),
            AppError::AuthenticationRequired => {
                "you must be authenticated to access this resource".to_string()
            }
            AppError::NotPermitted => {
                "your token doesn't have the necessary permissions to access this resource"
                    .to_string()
            }
            AppError::RateLimited => "rate limit exceeded".to_string(),
            AppError::Timeout | AppError::Database(_) | AppError::Internal(_) => {
                SERVER_ERROR_MESSAGE.to_string()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Database(detail) | AppError::Internal(detail) => {
                write!(f, "{}: {}", self.status_code(), detail)
            }
            AppError::Timeout => write!(f, "{}: store operation timed out", self.status_code()),
            _ => write!(f, "{}: {}", self.status_code(), self.message()),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AppError::Database(format!("Database error: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
            JsonRejection::JsonDataError(e) => e.body_text(),
            JsonRejection::MissingJsonContentType(_) => {
                "body must be sent with Content-Type: application/json".to_string()
            }
            JsonRejection::BytesRejection(_) => "body could not be read".to_string(),
            other => other.body_text(),
        };
        AppError::BadRequest(message)
    }
}

/// Payload of the `error` key: a plain message or per-field messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Message(String),
    Fields(FieldErrors),
}

/// Error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(error: &AppError) -> Self {
        let body = match error {
            AppError::FailedValidation(fields) => ErrorBody::Fields(fields.clone()),
            other => ErrorBody::Message(other.message()),
        };
        Self { error: body }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse::new(&self);
        let mut response = (status, Json(body)).into_response();

        if matches!(self, AppError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::FailedValidation(FieldErrors::new()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EditConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::NotPermitted.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Timeout.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = AppError::Database("no such table: drones".to_string());
        assert_eq!(err.message(), SERVER_ERROR_MESSAGE);
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_validation_body_is_field_map() {
        let mut fields = FieldErrors::new();
        fields.insert("title".to_string(), "must be provided".to_string());

        let body = serde_json::to_value(ErrorResponse::new(&AppError::FailedValidation(fields)))
            .unwrap();
        assert_eq!(body["error"]["title"], "must be provided");

        let body = serde_json::to_value(ErrorResponse::new(&AppError::NotFound)).unwrap();
        assert_eq!(body["error"], "the requested resource could not be found");
    }
}
