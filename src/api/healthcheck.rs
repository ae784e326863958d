//! Liveness endpoint.

use axum::extract::State;
use serde::Serialize;

use super::{success, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub system_info: SystemInfo,
}

/// GET /v1/healthcheck - Report that the service is up.
pub async fn healthcheck(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    success(HealthResponse {
        status: "available",
        system_info: SystemInfo {
            environment: state.config.env.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}
