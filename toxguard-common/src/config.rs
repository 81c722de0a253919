//! Configuration loading and resolution
//!
//! Every setting is resolved with the same priority order:
//! 1. Command-line argument or environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! Command-line parsing lives in the service binary; it hands the parsed
//! values over as a [`ConfigOverrides`].

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Compiled defaults
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://toxguard.db?mode=rwc";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 100;
pub const DEFAULT_THRESHOLD: f64 = 0.85;
pub const DEFAULT_DB_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_DB_RETRY_BASE_MS: u64 = 500;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub database_url: Option<String>,
    pub cors_origin: Option<String>,
    pub rate_limit_window_ms: Option<u64>,
    pub rate_limit_max: Option<u32>,
    pub expose_error_details: Option<bool>,
    pub model_path: Option<PathBuf>,
    pub default_threshold: Option<f64>,
    pub preload_model: Option<bool>,
    pub freeze_threshold: Option<bool>,
}

/// TOML config file contents (all fields optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub database_url: Option<String>,
    pub cors_origin: Option<String>,
    pub rate_limit_window_ms: Option<u64>,
    pub rate_limit_max: Option<u32>,
    pub expose_error_details: Option<bool>,
    pub model_path: Option<PathBuf>,
    pub default_threshold: Option<f64>,
    pub preload_model: Option<bool>,
    pub freeze_threshold: Option<bool>,
    pub db_connect_attempts: Option<u32>,
    pub db_retry_base_ms: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub database_url: String,
    pub cors_origin: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
    /// Return error messages to clients on analysis failures (development only)
    pub expose_error_details: bool,
    /// Lexicon asset file; `None` uses the embedded lexicon
    pub model_path: Option<PathBuf>,
    pub default_threshold: f64,
    pub preload_model: bool,
    /// Legacy behavior: classify every request at the first-load threshold
    pub freeze_threshold: bool,
    pub db_connect_attempts: u32,
    pub db_retry_base: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            rate_limit_window: Duration::from_millis(DEFAULT_RATE_LIMIT_WINDOW_MS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            expose_error_details: false,
            model_path: None,
            default_threshold: DEFAULT_THRESHOLD,
            preload_model: false,
            freeze_threshold: false,
            db_connect_attempts: DEFAULT_DB_CONNECT_ATTEMPTS,
            db_retry_base: Duration::from_millis(DEFAULT_DB_RETRY_BASE_MS),
        }
    }
}

impl ServerConfig {
    /// Merge overrides, config file and compiled defaults, then validate
    pub fn resolve(overrides: ConfigOverrides, file: Option<TomlConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        let config = Self {
            port: overrides.port.or(file.port).unwrap_or(defaults.port),
            host: overrides.host.or(file.host).unwrap_or(defaults.host),
            database_url: overrides
                .database_url
                .or(file.database_url)
                .unwrap_or(defaults.database_url),
            cors_origin: overrides
                .cors_origin
                .or(file.cors_origin)
                .unwrap_or(defaults.cors_origin),
            rate_limit_window: overrides
                .rate_limit_window_ms
                .or(file.rate_limit_window_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: overrides
                .rate_limit_max
                .or(file.rate_limit_max)
                .unwrap_or(defaults.rate_limit_max),
            expose_error_details: overrides
                .expose_error_details
                .or(file.expose_error_details)
                .unwrap_or(defaults.expose_error_details),
            model_path: overrides.model_path.or(file.model_path),
            default_threshold: overrides
                .default_threshold
                .or(file.default_threshold)
                .unwrap_or(defaults.default_threshold),
            preload_model: overrides
                .preload_model
                .or(file.preload_model)
                .unwrap_or(defaults.preload_model),
            freeze_threshold: overrides
                .freeze_threshold
                .or(file.freeze_threshold)
                .unwrap_or(defaults.freeze_threshold),
            db_connect_attempts: file
                .db_connect_attempts
                .unwrap_or(defaults.db_connect_attempts),
            db_retry_base: file
                .db_retry_base_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.db_retry_base),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if !is_valid_threshold(self.default_threshold) {
            return Err(Error::Config(format!(
                "default_threshold must be within [0, 1], got {}",
                self.default_threshold
            )));
        }
        if self.rate_limit_max == 0 {
            return Err(Error::Config("rate_limit_max must be at least 1".to_string()));
        }
        if self.rate_limit_window.is_zero() {
            return Err(Error::Config("rate_limit_window_ms must be positive".to_string()));
        }
        if self.db_connect_attempts == 0 {
            return Err(Error::Config("db_connect_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log the effective configuration at startup
    pub fn log(&self) {
        info!("Listen address: {}", self.bind_address());
        info!("Database: {}", self.database_url);
        info!("CORS origin: {}", self.cors_origin);
        info!(
            "Rate limit: {} requests per {}s window",
            self.rate_limit_max,
            self.rate_limit_window.as_secs()
        );
        match &self.model_path {
            Some(path) => info!("Model assets: {}", path.display()),
            None => info!("Model assets: embedded lexicon"),
        }
        info!(
            "Default threshold: {} (freeze_threshold = {})",
            self.default_threshold, self.freeze_threshold
        );
        if self.expose_error_details {
            warn!("Error details are exposed to clients; do not enable in production");
        }
    }
}

/// True for finite values in [0, 1]
pub fn is_valid_threshold(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Read a TOML config file
///
/// A missing or malformed file is not fatal: a warning is logged and the
/// remaining tiers (overrides and compiled defaults) apply.
pub fn load_toml_config(path: &Path) -> Option<TomlConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Config file {} not readable ({}), using defaults", path.display(), e);
            return None;
        }
    };

    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            Some(config)
        }
        Err(e) => {
            warn!("Config file {} is invalid ({}), using defaults", path.display(), e);
            None
        }
    }
}
