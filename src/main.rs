// src/main.rs

//! The main entry point for the hostplane agent.

use anyhow::Result;
use hostplane::config::Config;
use hostplane::core::agent;
use std::env;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("hostplane version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via a --config flag;
    // otherwise it defaults to "hostplane.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("hostplane.toml");

    // The agent cannot run without a valid configuration.
    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e}");
            std::process::exit(1);
        }
    };

    if args.contains(&"--dry-run".to_string()) {
        config.dry_run = true;
    }

    // Console logging always; file logging when configured.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        );
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
            .init();
    } else {
        registry.init();
    }

    info!("hostplane {} starting on host '{}'", VERSION, config.hostname);

    if let Err(e) = agent::run(config).await {
        error!("Agent runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
