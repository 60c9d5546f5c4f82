//! Application configuration loaded from environment variables.

use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;
use strum::{Display, EnumString};

/// Runtime mode, controls how much error detail reaches clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Mode {
    /// Full error detail: stack traces in responses, errors logged.
    #[serde(alias = "dev")]
    #[strum(to_string = "development", serialize = "dev")]
    Development,
    /// Unexpected faults are masked as a generic 500.
    #[default]
    #[serde(alias = "prod")]
    #[strum(to_string = "production", serialize = "prod")]
    Production,
    /// Neither masking nor stack traces.
    Test,
}

impl Mode {
    /// Whether stack traces are exposed and errors reported.
    pub fn is_development(self) -> bool {
        self == Mode::Development
    }

    /// Whether non-operational errors are masked.
    pub fn is_production(self) -> bool {
        self == Mode::Production
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Runtime ===
    /// Runtime mode (development, production, test).
    #[serde(default)]
    pub app_env: Mode,

    // === Server Configuration ===
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    // === Logging ===
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_env: Mode::default(),
            host: default_host(),
            port: default_port(),
            rust_log: default_log_level(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("PORT must be non-zero".to_string());
        }

        if self.host.parse::<IpAddr>().is_err() {
            return Err(format!("HOST is not an IP address: {}", self.host));
        }

        Ok(())
    }

    /// Socket address the server binds to.
    pub fn listen_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| format!("HOST is not an IP address: {}", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
