//! contract-host
//!
//! Serves the sample contract and any configured static sites.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ http::server ──▶ http::cors
//!                     (accept fan-out)  (hyper, span)        │
//!                                                            ▼
//!                                         routing (services) / site (files)
//!                                                            │
//!     Client Response                                        ▼
//!     ◀────────────── http::response ◀──── codec ◀──── operation handler
//! ```

use std::path::PathBuf;

use clap::Parser;

use contract_host::config::{load_config, validate_config, ServerConfig};
use contract_host::lifecycle::startup;
use contract_host::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "contract-host", version, about = "Embedded HTTP contract host")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener prefix, e.g. `http://+:8080/api/`. Replaces configured prefixes.
    #[arg(short, long = "prefix")]
    prefixes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if !cli.prefixes.is_empty() {
        config.listener.prefixes = cli.prefixes;
        if let Err(errors) = validate_config(&config) {
            for error in &errors {
                eprintln!("invalid configuration: {error}");
            }
            return Err("invalid configuration".into());
        }
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "contract-host starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
