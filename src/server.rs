//! Server assembly and lifecycle.

use std::time::Duration;

use axum::body::Body;
use axum::http::Response;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Span};

use crate::api::pipeline::ErrorMessage;
use crate::api::{api_router, create_router, AppState, ErrorHandler};
use crate::config::Config;

/// Errors that stop the server from starting or running.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the full application: API routes, error pipeline, optional
/// `/metrics` endpoint and access logging.
pub fn build_app(config: &Config, metrics: Option<PrometheusHandle>) -> Router {
    let state = AppState::new(config.app_env);
    let errors = ErrorHandler::with_tracing(config.app_env);
    let mut app = create_router(state, api_router(), errors);

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    app.layer(TraceLayer::new_for_http().on_response(log_response))
}

fn log_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    let latency_ms = latency.as_millis() as u64;
    match response.extensions().get::<ErrorMessage>() {
        Some(ErrorMessage(message)) => warn!(
            status = response.status().as_u16(),
            latency_ms,
            error = %message,
            "request failed"
        ),
        None => debug!(
            status = response.status().as_u16(),
            latency_ms,
            "request finished"
        ),
    }
}

/// Bind and serve until a shutdown signal arrives.
pub async fn run(config: Config, metrics: Option<PrometheusHandle>) -> Result<(), ServerError> {
    config.validate().map_err(ServerError::Config)?;
    let addr = config.listen_addr().map_err(ServerError::Config)?;

    let app = build_app(&config, metrics);
    let listener = TcpListener::bind(addr).await?;
    info!(mode = %config.app_env, "HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
