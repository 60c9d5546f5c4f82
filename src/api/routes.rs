//! HTTP API route definitions.

use axum::{routing::get, Router};

use super::handlers::{api_status, health, AppState};
use super::pipeline::{register_error_handlers, ErrorHandler};

/// Path of the status endpoint.
pub const STATUS_PATH: &str = "/api/status";
/// Prefix every API route is nested under.
pub const API_PREFIX: &str = "/api";

/// Mount the status endpoint, then hand everything under `/api` to `api`.
///
/// `api` must not define `/status` itself; axum rejects overlapping routes.
pub fn register_routes(app: Router<AppState>, api: Router<AppState>) -> Router<AppState> {
    app.route(STATUS_PATH, get(api_status)).nest(API_PREFIX, api)
}

/// Router served under `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Create the application router: routes first, error pipeline last.
pub fn create_router(state: AppState, api: Router<AppState>, errors: ErrorHandler) -> Router {
    let app = register_routes(Router::new(), api);
    register_error_handlers(app, errors).with_state(state)
}
