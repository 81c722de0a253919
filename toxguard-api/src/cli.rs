//! Command-line arguments
//!
//! Every option can also come from the environment; anything left unset
//! falls through to the config file and then the compiled defaults.

use clap::Parser;
use std::path::PathBuf;
use toxguard_common::config::ConfigOverrides;

/// Command-line arguments for toxguard-api
#[derive(Parser, Debug, Default)]
#[command(name = "toxguard-api")]
#[command(about = "Toxicity analysis HTTP service")]
#[command(version)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "TOXGUARD_HOST")]
    pub host: Option<String>,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Single origin allowed to call the API with credentials
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Rate-limit window length in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS")]
    pub rate_limit_window_ms: Option<u64>,

    /// Requests allowed per client per window
    #[arg(long, env = "RATE_LIMIT_MAX")]
    pub rate_limit_max: Option<u32>,

    /// Include error messages in analysis failure responses
    #[arg(long, env = "TOXGUARD_EXPOSE_ERROR_DETAILS", num_args = 0..=1, default_missing_value = "true")]
    pub expose_error_details: Option<bool>,

    /// Lexicon JSON file (defaults to the embedded lexicon)
    #[arg(long, env = "TOXGUARD_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Threshold used when a request does not supply one
    #[arg(long, env = "TOXGUARD_DEFAULT_THRESHOLD")]
    pub default_threshold: Option<f64>,

    /// Load the model at startup instead of on the first request
    #[arg(long, env = "TOXGUARD_PRELOAD_MODEL", num_args = 0..=1, default_missing_value = "true")]
    pub preload_model: Option<bool>,

    /// Classify every request at the threshold the model was first loaded with
    #[arg(long, env = "TOXGUARD_FREEZE_THRESHOLD", num_args = 0..=1, default_missing_value = "true")]
    pub freeze_threshold: Option<bool>,

    /// TOML config file
    #[arg(short, long, env = "TOXGUARD_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Settings given on the command line or in the environment
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            port: self.port,
            host: self.host.clone(),
            database_url: self.database_url.clone(),
            cors_origin: self.cors_origin.clone(),
            rate_limit_window_ms: self.rate_limit_window_ms,
            rate_limit_max: self.rate_limit_max,
            expose_error_details: self.expose_error_details,
            model_path: self.model_path.clone(),
            default_threshold: self.default_threshold,
            preload_model: self.preload_model,
            freeze_threshold: self.freeze_threshold,
        }
    }
}
