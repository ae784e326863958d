//! Drone API endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::{created, read_id_param, success, ApiResult, MessageEnvelope};
use crate::errors::AppError;
use crate::models::{
    validate_drone, validate_filters, validate_record, CreateDroneRequest, Drone, DroneResponse,
    Metadata, UpdateDroneRequest, DEFAULT_PAGE_SIZE,
};
use crate::validator::Validator;
use crate::AppState;

/// `{"drone": ...}` envelope.
#[derive(Debug, Serialize)]
pub struct DroneEnvelope {
    pub drone: DroneResponse,
}

/// `{"drones": [...], "metadata": {...}}` envelope.
#[derive(Debug, Serialize)]
pub struct DroneListEnvelope {
    pub drones: Vec<DroneResponse>,
    pub metadata: Metadata,
}

/// Query string for listing drones. Values are kept raw so that bad numbers
/// surface as validation errors rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct ListDronesQuery {
    #[serde(default)]
    pub title: Option<String>,
    /// Comma separated
    #[serde(default)]
    pub categories: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Parse an integer query value, recording a validation error if it is not one.
fn read_int(v: &mut Validator, raw: Option<&str>, key: &str, default: i64) -> i64 {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(s) => s.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

fn read_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// GET /v1/drones - List drones with filtering, sorting and pagination.
pub async fn list_drones(
    State(state): State<AppState>,
    query: Result<Query<ListDronesQuery>, QueryRejection>,
) -> ApiResult<DroneListEnvelope> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let mut v = Validator::new();
    let page = read_int(&mut v, params.page.as_deref(), "page", 1);
    let page_size = read_int(
        &mut v,
        params.page_size.as_deref(),
        "page_size",
        DEFAULT_PAGE_SIZE,
    );
    let sort = params.sort.as_deref().unwrap_or("id");
    let filters = validate_filters(&mut v, page, page_size, sort);
    v.into_result()?;

    let title = params.title.unwrap_or_default();
    let categories = read_csv(params.categories.as_deref());

    let (drones, metadata) = state
        .repo
        .list_drones(title.trim(), &categories, &filters)
        .await?;

    success(DroneListEnvelope {
        drones: drones.into_iter().map(DroneResponse::from).collect(),
        metadata,
    })
}

/// GET /v1/drones/:id - Get a single drone.
pub async fn show_drone(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DroneEnvelope> {
    let id = read_id_param(&id)?;
    let drone = state.repo.get_drone(id).await?;

    success(DroneEnvelope {
        drone: drone.into(),
    })
}

/// POST /v1/drones - Create a new drone.
pub async fn create_drone(
    State(state): State<AppState>,
    body: Result<Json<CreateDroneRequest>, JsonRejection>,
) -> ApiResult<DroneEnvelope> {
    let Json(input) = body?;

    let mut v = Validator::new();
    validate_drone(
        &mut v,
        &input.title,
        input.year,
        input.price,
        input.categories.as_deref(),
        current_year(),
    );
    v.into_result()?;

    let mut drone = Drone::new(
        input.title,
        input.year,
        input.price,
        input.categories.unwrap_or_default(),
    );
    state.repo.insert_drone(&mut drone).await?;
    tracing::info!(id = drone.id, "Created drone");

    let location = format!("/v1/drones/{}", drone.id);
    created(
        DroneEnvelope {
            drone: drone.into(),
        },
        location,
    )
}

/// PATCH /v1/drones/:id - Partially update a drone.
pub async fn update_drone(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateDroneRequest>, JsonRejection>,
) -> ApiResult<DroneEnvelope> {
    let id = read_id_param(&id)?;
    let mut drone = state.repo.get_drone(id).await?;

    let Json(changes) = body?;

    // Check version for optimistic concurrency
    if let Some(expected) = changes.expected_version {
        if expected != drone.version {
            return Err(AppError::EditConflict);
        }
    }

    drone.apply(changes);

    let mut v = Validator::new();
    validate_record(&mut v, &drone, current_year());
    v.into_result()?;

    state.repo.update_drone(&mut drone).await?;
    tracing::info!(id = drone.id, version = drone.version, "Updated drone");

    success(DroneEnvelope {
        drone: drone.into(),
    })
}

/// DELETE /v1/drones/:id - Delete a drone.
pub async fn delete_drone(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageEnvelope> {
    let id = read_id_param(&id)?;
    state.repo.delete_drone(id).await?;
    tracing::info!(id, "Deleted drone");

    success(MessageEnvelope {
        message: "drone successfully deleted".to_string(),
    })
}
