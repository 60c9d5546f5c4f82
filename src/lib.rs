//! HTTP API server shell with a normalized JSON error pipeline.
//!
//! Every failure a client can observe goes through the same three stages:
//! an unmatched route becomes a 404, any raised error is converted into a
//! normalized [`ApiError`], and the terminal handler renders it as
//!
//! ```text
//! { "status": "error" | "fail", "code": 404, "message": "...", "stack"?: "..." }
//! ```
//!
//! In production mode unexpected faults are masked as a generic 500; in
//! development mode the stack trace is included and the error is logged.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Error types and the conversion stage
//! - [`api`]: Route registration, handlers and the error pipeline
//! - [`metrics`]: Prometheus metrics
//! - [`server`]: Server assembly and lifecycle

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;

pub use config::{Config, Mode};
pub use error::{convert_error, ApiError, AppError};
