//! API server entry point.

use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api_server::config::{Config, Mode};
use api_server::metrics;
use api_server::server;

/// HTTP API server with a normalized JSON error pipeline.
#[derive(Parser, Debug)]
#[command(name = "api-server")]
#[command(about = "HTTP API server with uniform JSON error responses")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime mode override (development, production, test).
    #[arg(long, global = true)]
    env: Option<Mode>,

    /// HTTP server port override.
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve HTTP until interrupted (default).
    Run,

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration, CLI flags win over the environment
    let mut config = Config::load()?;
    if let Some(mode) = args.env {
        config.app_env = mode;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("api_server=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::Run) | None => cmd_run(config).await,
    }
}

/// Check configuration validity.
fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("API SERVER - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Mode: {}", config.app_env);
    println!("  Listen: {}:{}", config.host, config.port);
    println!("  Log Level: {}", config.rust_log);
    println!("  JSON Logs: {}", config.log_json);
    if config.app_env.is_development() {
        println!("  WARNING: development mode exposes stack traces to clients");
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Serve HTTP until a shutdown signal arrives.
async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let handle = install_metrics();
    info!(mode = %config.app_env, "Starting API server");
    server::run(config, handle).await?;
    Ok(())
}

/// Install the Prometheus recorder. Metrics are optional: on failure the
/// server still runs, without `/metrics`.
fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            metrics::init_metrics();
            let upkeep = handle.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(5));
                loop {
                    interval.tick().await;
                    upkeep.run_upkeep();
                }
            });
            Some(handle)
        }
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    }
}
