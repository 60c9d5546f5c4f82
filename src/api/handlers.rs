//! HTTP API handlers.

use std::time::Instant;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::config::Mode;

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runtime mode the server was started in.
    pub mode: Mode,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Create new app state.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            started_at: Instant::now(),
        }
    }

    /// Whole seconds since start.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Runtime mode.
    pub env: String,
    /// Crate version.
    pub version: &'static str,
    /// Seconds since start.
    pub uptime_seconds: u64,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Status handler - returns service mode, version and uptime.
pub async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: "ok",
        env: state.mode.to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}
