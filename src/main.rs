//! Drone Catalog Backend
//!
//! A REST backend for drone catalog records with SQLite persistence and
//! bearer-token permissions.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod validator;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::rate_limit::RateLimiter;
use config::{Config, LogFormat};
use db::Repository;
use errors::AppError;
use models::Permission;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config);

    tracing::info!("Starting Drone Catalog Backend");
    tracing::info!("Environment: {}", config.env);
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if !config.limiter.enabled {
        tracing::warn!("Rate limiting is disabled (DRONES_LIMITER_ENABLED=false)");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool, config.query_timeout));

    if let Some(token) = &config.bootstrap_token {
        repo.insert_token(token, "bootstrap", &Permission::ALL, None)
            .await?;
        tracing::info!("Bootstrap token granted read and write permissions");
    } else {
        tracing::warn!("No DRONES_BOOTSTRAP_TOKEN configured; only existing tokens can write");
    }

    let state = AppState {
        repo,
        limiter: RateLimiter::new(&config.limiter),
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the application router with all routes.
///
/// Interceptors run outermost first: trace, panic recovery, CORS, rate limit,
/// authentication. Permission checks are layered per route group.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_trusted_origins);

    let read_routes = Router::new()
        .route("/v1/drones", get(api::list_drones))
        .route("/v1/drones/{id}", get(api::show_drone))
        .route_layer(middleware::from_fn(|req, next| {
            auth::require_permission(Permission::DronesRead, req, next)
        }));

    let write_routes = Router::new()
        .route("/v1/drones", post(api::create_drone))
        .route(
            "/v1/drones/{id}",
            patch(api::update_drone).delete(api::delete_drone),
        )
        .route_layer(middleware::from_fn(|req, next| {
            auth::require_permission(Permission::DronesWrite, req, next)
        }));

    Router::new()
        .route("/v1/healthcheck", get(api::healthcheck))
        .merge(read_routes)
        .merge(write_routes)
        .fallback(api::not_found)
        .method_not_allowed_fallback(api::method_not_allowed)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::rate_limit::rate_limit,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::authenticate,
                )),
        )
        .with_state(state)
}

/// CORS configuration: any origin unless trusted origins are configured.
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any);

    if trusted_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Render a handler panic as the generic 500 envelope and close the connection.
fn handle_panic(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = AppError::Internal(format!("handler panicked: {}", detail)).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests;
