//! Error types and the conversion stage of the error pipeline.
//!
//! Handlers return [`AppError`]. Whatever variant they raise, the pipeline
//! runs it through [`convert_error`] so the terminal handler only ever sees
//! one shape: the normalized [`ApiError`].

use std::backtrace::Backtrace;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Normalized error: the only shape the terminal handler renders.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status of the response.
    pub status: StatusCode,
    /// Client-facing message.
    pub message: String,
    /// Raised on purpose by application logic and safe to show.
    pub is_operational: bool,
    /// Diagnostic trace.
    pub stack: Option<String>,
}

impl ApiError {
    /// Operational error raised by application code. Captures a trace at
    /// the call site.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message_or_reason(message.into(), status);
        let stack = capture_trace("ApiError", &message);
        Self {
            status,
            message,
            is_operational: true,
            stack: Some(stack),
        }
    }

    /// Error built from an unexpected fault; keeps the fault's own trace,
    /// or captures one here when the fault had none.
    pub fn non_operational(status: StatusCode, message: impl Into<String>, stack: Option<String>) -> Self {
        let message = message_or_reason(message.into(), status);
        let stack = stack.unwrap_or_else(|| capture_trace("ApiError", &message));
        Self {
            status,
            message,
            is_operational: false,
            stack: Some(stack),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

/// Error raised by a handler, before normalization.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Already normalized; the converter passes it through untouched.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Data validation failure (malformed or rejected payload).
    #[error("validation error: {message}")]
    Validation {
        /// Explicit status carried by the error, if any.
        status: Option<u16>,
        /// Raw message, possibly empty.
        message: String,
        /// Trace captured where the failure was first caught.
        trace: String,
    },

    /// Unexpected fault.
    #[error("{message}")]
    Fault {
        /// Explicit status carried by the error, if any.
        status: Option<u16>,
        /// Raw message, possibly empty.
        message: String,
        /// Trace captured where the fault was first caught.
        trace: String,
    },
}

impl AppError {
    /// Unexpected fault without an explicit status.
    pub fn fault(message: impl Into<String>) -> Self {
        let message = message.into();
        let trace = capture_trace("Fault", &message);
        AppError::Fault {
            status: None,
            message,
            trace,
        }
    }

    /// Fault raised by a panicking handler. The trace is taken where the
    /// panic was caught, not where it was raised; the panic message is the
    /// only pointer back to the panic site.
    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        let message = message.into();
        let trace = capture_trace("Panic", &message);
        AppError::Fault {
            status: None,
            message,
            trace,
        }
    }

    /// Validation failure without an explicit status.
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        let trace = capture_trace("ValidationError", &message);
        AppError::Validation {
            status: None,
            message,
            trace,
        }
    }

    /// Attach an explicit status code to a raw error. No effect on
    /// already-normalized errors.
    pub fn with_status(mut self, code: u16) -> Self {
        match &mut self {
            AppError::Api(_) => {}
            AppError::Validation { status, .. } | AppError::Fault { status, .. } => {
                *status = Some(code);
            }
        }
        self
    }

    /// Whether the error belongs to the data validation domain.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Fault {
            status: None,
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::fault(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::validation(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Api(ApiError::new(rejection.status(), rejection.body_text()))
    }
}

/// Error responses carry the unconverted error in their extensions; the
/// pipeline middleware picks it up from there. Without the middleware the
/// client sees a bare 500.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        AppError::Api(self).into_response()
    }
}

/// Convert any raised error into a normalized [`ApiError`].
///
/// Status precedence for raw errors: a usable explicit status wins, then
/// 400 for validation errors, then 500. The result is non-operational and
/// keeps the original trace.
pub fn convert_error(err: AppError) -> ApiError {
    let is_validation = err.is_validation();
    match err {
        AppError::Api(err) => err,
        AppError::Validation {
            status,
            message,
            trace,
        }
        | AppError::Fault {
            status,
            message,
            trace,
        } => {
            let status = resolve_status(status, is_validation);
            ApiError::non_operational(status, message, Some(trace))
        }
    }
}

fn resolve_status(explicit: Option<u16>, is_validation: bool) -> StatusCode {
    explicit
        .filter(|code| *code != 0)
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(if is_validation {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Canonical reason phrase, e.g. "Internal Server Error".
pub fn reason_phrase(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Error")
}

fn message_or_reason(message: String, status: StatusCode) -> String {
    if message.is_empty() {
        reason_phrase(status).to_string()
    } else {
        message
    }
}

fn capture_trace(kind: &str, message: &str) -> String {
    format!("{kind}: {message}\n{}", Backtrace::force_capture())
}
