//! Configuration module for the drone catalog backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {:?}", other)),
        }
    }
}

/// Per-IP request limiting settings.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub enabled: bool,
    /// Requests allowed per client within one window
    pub max_requests: u32,
    pub window: Duration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Environment name reported by the healthcheck
    pub env: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Upper bound for every store operation
    pub query_timeout: Duration,
    pub limiter: LimiterConfig,
    /// Origins allowed by CORS; empty means any origin
    pub cors_trusted_origins: Vec<String>,
    /// Token seeded at startup with read and write permissions
    pub bootstrap_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let bind_addr = parse_var("DRONES_BIND_ADDR", "127.0.0.1:4000")?;

        let db_path = env::var("DRONES_DB_PATH")
            .unwrap_or_else(|_| "./data/drones.sqlite".to_string())
            .into();

        let env_name = env::var("DRONES_ENV").unwrap_or_else(|_| "development".to_string());
        let log_level = env::var("DRONES_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = parse_var("DRONES_LOG_FORMAT", "pretty")?;

        let timeout_secs: u64 = parse_var("DRONES_QUERY_TIMEOUT_SECS", "3")?;
        let limiter_window_secs: u64 = parse_var("DRONES_LIMITER_WINDOW_SECS", "1")?;

        let limiter = LimiterConfig {
            enabled: parse_var("DRONES_LIMITER_ENABLED", "true")?,
            max_requests: parse_var("DRONES_LIMITER_MAX_REQUESTS", "4")?,
            window: Duration::from_secs(limiter_window_secs),
        };

        let cors_trusted_origins = env::var("DRONES_CORS_TRUSTED_ORIGINS")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let bootstrap_token = env::var("DRONES_BOOTSTRAP_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        Ok(Self {
            bind_addr,
            db_path,
            env: env_name,
            log_level,
            log_format,
            query_timeout: Duration::from_secs(timeout_secs),
            limiter,
            cors_trusted_origins,
            bootstrap_token,
        })
    }
}

fn parse_var<T>(key: &str, default: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| format!("Invalid {} value {:?}: {}", key, raw, e))
}
