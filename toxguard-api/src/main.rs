//! toxguard-api - Toxicity analysis service
//!
//! Classifies submitted text with a lazily loaded model, stores every
//! analysis, and serves recent history and health over HTTP.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toxguard_api::cli::Args;
use toxguard_api::lifecycle;
use toxguard_api::model::LexiconLoader;
use toxguard_common::config::{load_toml_config, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "toxguard_api=info,toxguard_common=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting ToxGuard v{}", env!("CARGO_PKG_VERSION"));

    let file_config = args.config.as_deref().and_then(load_toml_config);
    let config = ServerConfig::resolve(args.overrides(), file_config)?;
    config.log();

    let loader = Arc::new(LexiconLoader::new(config.model_path.clone()));
    lifecycle::run(config, loader).await?;

    info!("Shutdown complete");
    Ok(())
}
