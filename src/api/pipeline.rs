//! Error pipeline: fallback, conversion and terminal rendering.
//!
//! Stages run in a fixed order for every request that matches no route or
//! whose handler fails:
//!
//! 1. [`not_found`] turns an unmatched request into a 404 [`ApiError`].
//! 2. [`convert_error`] normalizes whatever the handler raised.
//! 3. [`ErrorHandler::handle`] renders the single JSON error response.
//!
//! [`register_error_handlers`] wires all three onto a router. It must be
//! called after every route is registered, since layers only wrap the
//! routes that already exist.

use std::any::Any;
use std::sync::Arc;

use axum::extract::{OriginalUri, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, error};

use crate::config::Mode;
use crate::error::{convert_error, reason_phrase, ApiError, AppError};
use crate::metrics;

/// Destination for diagnostic error reports in development mode.
pub trait ErrorSink: Send + Sync {
    /// Record an error before its response is sent.
    fn report(&self, err: &ApiError);
}

/// Reports errors through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, err: &ApiError) {
        error!(
            code = err.status.as_u16(),
            operational = err.is_operational,
            stack = err.stack.as_deref().unwrap_or_default(),
            "{}",
            err.message
        );
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// "error" below 500, "fail" otherwise.
    pub status: &'static str,
    /// HTTP status code.
    pub code: u16,
    /// Client-facing message.
    pub message: String,
    /// Diagnostic trace, development mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Unmasked message of the error behind a response, for access logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage(pub String);

/// Terminal stage: turns a normalized error into the response.
#[derive(Clone)]
pub struct ErrorHandler {
    mode: Mode,
    sink: Arc<dyn ErrorSink>,
}

impl ErrorHandler {
    /// Create a handler for `mode` reporting to `sink`.
    pub fn new(mode: Mode, sink: Arc<dyn ErrorSink>) -> Self {
        Self { mode, sink }
    }

    /// Create a handler reporting through `tracing`.
    pub fn with_tracing(mode: Mode) -> Self {
        Self::new(mode, Arc::new(TracingSink))
    }

    fn masks(&self, err: &ApiError) -> bool {
        self.mode.is_production() && !err.is_operational
    }

    /// Status and body for `err`, without side effects.
    pub fn render(&self, err: &ApiError) -> (StatusCode, ErrorBody) {
        let (status, message) = if self.masks(err) {
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (status, reason_phrase(status).to_string())
        } else {
            (err.status, err.message.clone())
        };

        let body = ErrorBody {
            status: if status.as_u16() < 500 { "error" } else { "fail" },
            code: status.as_u16(),
            message,
            stack: if self.mode.is_development() {
                Some(
                    err.stack
                        .clone()
                        .unwrap_or_else(|| format!("ApiError: {}", err.message)),
                )
            } else {
                None
            },
        };

        (status, body)
    }

    /// Render `err` as the response, reporting it first in development mode.
    pub fn handle(&self, err: ApiError) -> Response {
        let (status, body) = self.render(&err);

        if self.mode.is_development() {
            self.sink.report(&err);
        }
        if self.masks(&err) {
            metrics::inc_masked_faults();
        }
        metrics::inc_error_responses(status);

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorMessage(err.message));
        response
    }
}

/// Router fallback: every unmatched request becomes a 404.
pub async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    metrics::inc_not_found();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    debug!(path, "no route matched");
    ApiError::not_found(format!("Not Found: {path}")).into()
}

/// Upper bound on a framework rejection body read back as a message.
const REJECTION_BODY_LIMIT: usize = 16 * 1024;

/// Middleware running the conversion and terminal stages.
///
/// Besides responses carrying an [`AppError`], it catches error responses
/// the framework builds on its own: a method mismatch (405) is an
/// unmatched route and goes to [`not_found`]; any other 4xx/5xx without an
/// [`AppError`] (extractor rejections) becomes a raw error with that
/// status.
pub async fn handle_errors(
    State(handler): State<ErrorHandler>,
    request: Request,
    next: Next,
) -> Response {
    let _timer = metrics::timer_http_request();
    let uri = request
        .extensions()
        .get::<OriginalUri>()
        .cloned()
        .unwrap_or_else(|| OriginalUri(request.uri().clone()));
    let mut response = next.run(request).await;
    let pending = response.extensions_mut().remove::<AppError>();

    let err = match pending {
        Some(err) => err,
        None if response.status() == StatusCode::METHOD_NOT_ALLOWED => not_found(uri).await,
        None if response.status().is_client_error() || response.status().is_server_error() => {
            rejection_to_error(response).await
        }
        None => return response,
    };

    handler.handle(convert_error(err))
}

/// Raw error for an error response the framework produced itself. The
/// body text is the message; client errors are validation failures.
async fn rejection_to_error(response: Response) -> AppError {
    let status = response.status();
    let message = match axum::body::to_bytes(response.into_body(), REJECTION_BODY_LIMIT).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    debug!(code = status.as_u16(), %message, "framework rejection");

    let err = if status.is_client_error() {
        AppError::validation(message)
    } else {
        AppError::fault(message)
    };
    err.with_status(status.as_u16())
}

/// A panicking handler is an unexpected fault like any other. The trace is
/// the catch site inside the panic layer; the panic message is kept as
/// the error message.
fn panic_to_error(payload: Box<dyn Any + Send + 'static>) -> Response {
    metrics::inc_handler_panics();
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        String::new()
    };
    AppError::panicked(message).into_response()
}

/// Attach the error pipeline to `app`: fallback, panic capture, then the
/// converting middleware.
pub fn register_error_handlers<S>(app: Router<S>, handler: ErrorHandler) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    app.fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_to_error))
        .layer(middleware::from_fn_with_state(handler, handle_errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Path;
    use axum::http::Method;
    use axum::routing::get;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl ErrorSink for RecordingSink {
        fn report(&self, err: &ApiError) {
            self.0.lock().unwrap().push(err.message.clone());
        }
    }

    fn handler(mode: Mode) -> (ErrorHandler, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ErrorHandler::new(mode, sink.clone()), sink)
    }

    #[test]
    fn production_masks_non_operational_errors() {
        let (handler, _) = handler(Mode::Production);
        let err = convert_error(AppError::validation("column \"secret\" missing"));

        let (status, body) = handler.render(&err);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            ErrorBody {
                status: "fail",
                code: 500,
                message: "Internal Server Error".to_string(),
                stack: None,
            }
        );
    }

    #[test]
    fn production_keeps_operational_errors() {
        let (handler, _) = handler(Mode::Production);
        let err = ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "maintenance window");

        let (status, body) = handler.render(&err);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "fail");
        assert_eq!(body.message, "maintenance window");
        assert_eq!(body.stack, None);
    }

    #[test]
    fn development_exposes_stack_and_reports() {
        let (handler, sink) = handler(Mode::Development);
        let err = convert_error(AppError::fault("boom"));

        let (status, body) = handler.render(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "boom");
        assert!(body.stack.unwrap().starts_with("Fault: boom"));

        let response = handler.handle(err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*sink.0.lock().unwrap(), vec!["boom".to_string()]);
    }

    #[test]
    fn development_body_has_stack_even_without_trace() {
        let (handler, _) = handler(Mode::Development);
        let err = ApiError {
            status: StatusCode::BAD_REQUEST,
            message: "hand built".to_string(),
            is_operational: true,
            stack: None,
        };

        let (_, body) = handler.render(&err);
        assert_eq!(body.stack.as_deref(), Some("ApiError: hand built"));
    }

    #[test]
    fn test_mode_neither_masks_nor_reports() {
        let (handler, sink) = handler(Mode::Test);
        let err = convert_error(AppError::fault("boom"));

        let (_, body) = handler.render(&err);
        assert_eq!(body.message, "boom");
        assert_eq!(body.stack, None);

        handler.handle(err);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn status_label_splits_at_500() {
        let (handler, _) = handler(Mode::Test);

        let (_, body) = handler.render(&ApiError::new(StatusCode::from_u16(499).unwrap(), "x"));
        assert_eq!(body.status, "error");

        let (_, body) = handler.render(&ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "x"));
        assert_eq!(body.status, "fail");
    }

    #[test]
    fn handle_attaches_unmasked_message() {
        let (handler, _) = handler(Mode::Production);
        let response = handler.handle(convert_error(AppError::fault("db pool exhausted")));

        assert_eq!(
            response.extensions().get::<ErrorMessage>(),
            Some(&ErrorMessage("db pool exhausted".to_string()))
        );
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    async fn item(Path(id): Path<u32>) -> String {
        id.to_string()
    }

    fn app(mode: Mode) -> Router {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/panic", get(explode))
            .route("/items/:id", get(item));
        register_error_handlers(router, ErrorHandler::new(mode, Arc::new(TracingSink)))
    }

    fn get_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn matched_routes_pass_through() {
        let response = app(Mode::Production)
            .oneshot(get_request("/ok"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unmatched_route_keeps_query_in_message() {
        let response = app(Mode::Production)
            .oneshot(get_request("/missing?page=2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Not Found: /missing?page=2");
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn panics_become_masked_faults() {
        let response = app(Mode::Production)
            .oneshot(get_request("/panic"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Internal Server Error");
    }

    #[tokio::test]
    async fn panics_surface_payload_in_test_mode() {
        let response = app(Mode::Test)
            .oneshot(get_request("/panic"))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["message"], "handler exploded");
    }

    #[tokio::test]
    async fn panic_trace_is_labelled_as_panic() {
        let response = app(Mode::Development)
            .oneshot(get_request("/panic"))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert!(body["stack"]
            .as_str()
            .unwrap()
            .starts_with("Panic: handler exploded"));
    }

    #[tokio::test]
    async fn wrong_method_is_not_found() {
        let request = axum::http::Request::builder()
            .method(Method::DELETE)
            .uri("/ok")
            .body(Body::empty())
            .unwrap();
        let response = app(Mode::Production).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Not Found: /ok");
    }

    #[tokio::test]
    async fn path_rejection_keeps_its_status_outside_production() {
        let response = app(Mode::Test)
            .oneshot(get_request("/items/abc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], 400);
        assert_ne!(body["message"], "Bad Request");
    }

    #[tokio::test]
    async fn path_rejection_is_masked_in_production() {
        let response = app(Mode::Production)
            .oneshot(get_request("/items/abc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal Server Error");
    }
}
