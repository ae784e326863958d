//! REST API module.
//!
//! Every response body is an envelope keyed by the resource name.

mod drones;
mod healthcheck;

pub use drones::*;
pub use healthcheck::*;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;

/// Success response: a status, an optional `Location` and an envelope body.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(location) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            response.headers_mut().insert(header::LOCATION, location);
        }
        response
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a 200 response.
pub fn success<T: Serialize>(body: T) -> ApiResult<T> {
    Ok(ApiResponse {
        status: StatusCode::OK,
        location: None,
        body,
    })
}

/// Create a 201 response pointing at the new resource.
pub fn created<T: Serialize>(body: T, location: String) -> ApiResult<T> {
    Ok(ApiResponse {
        status: StatusCode::CREATED,
        location: Some(location),
        body,
    })
}

/// `{"message": ...}` envelope for operations without a resource payload.
#[derive(Debug, Serialize)]
pub struct MessageEnvelope {
    pub message: String,
}

/// Parse a path id. Anything that is not a positive integer is treated as missing.
pub fn read_id_param(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Fallback for known routes requested with an unsupported method.
pub async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}
