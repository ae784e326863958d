//! Per-client fixed-window rate limiting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::LimiterConfig;
use crate::errors::AppError;
use crate::AppState;

/// Number of tracked clients above which expired windows are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

struct ClientWindow {
    count: u32,
    window_start: Instant,
}

#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    /// client IP -> current window
    clients: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

impl RateLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: config.window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `true` if the request is allowed, `false` if rate-limited.
    pub async fn check(&self, client: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let mut clients = self.clients.lock().await;
        let now = Instant::now();

        if clients.len() > PRUNE_THRESHOLD {
            let window = self.window;
            clients.retain(|_, entry| now.duration_since(entry.window_start) < window);
        }

        let entry = clients
            .entry(client.to_owned())
            .or_insert_with(|| ClientWindow {
                count: 0,
                window_start: now,
            });

        // Reset window if expired
        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count = entry.count.saturating_add(1);
        entry.count <= self.max_requests
    }
}

/// Extract client IP: X-Forwarded-For header first, then peer address.
fn client_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_owned();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Rate limit middleware applied to every route.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    if !state.limiter.check(&ip).await {
        tracing::warn!(client = %ip, "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}
