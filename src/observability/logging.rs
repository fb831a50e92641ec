//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber from configuration
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - Initialization is `try_init`, so tests and embedders can call it repeatedly

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::ObservabilityConfig;

/// Install the global subscriber. Returns `false` if one was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let fmt_layer = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        _ => tracing_subscriber::fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
