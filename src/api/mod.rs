//! HTTP API module: route registration and the error pipeline.

pub mod handlers;
pub mod pipeline;
pub mod routes;

pub use handlers::AppState;
pub use pipeline::{register_error_handlers, ErrorHandler, ErrorSink, TracingSink};
pub use routes::{api_router, create_router, register_routes};
