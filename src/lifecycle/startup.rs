//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server from validated configuration
//! - Register the sample service and the configured sites
//! - Bind listeners and begin accepting traffic
//! - Dispose the server when a shutdown signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when every binding is registered)

use std::sync::Arc;

use thiserror::Error;

use crate::codec::JsonCodec;
use crate::config::{ConfigError, ServerConfig};
use crate::http::Server;
use crate::lifecycle::signals::wait_for_signal;
use crate::net::BindError;
use crate::routing::PatternError;
use crate::sample::SampleService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("contract registration: {0}")]
    Pattern(#[from] PatternError),

    #[error("listener: {0}")]
    Bind(#[from] BindError),
}

/// A server with every binding from `config` registered, not yet started.
pub fn build_server(config: &ServerConfig) -> Result<Server, StartupError> {
    let mut server = Server::from_config(config);

    let mut sample = SampleService::new().binding()?;
    if config.dispatch.pretty_json {
        sample = sample.with_codec(Arc::new(JsonCodec::pretty()));
    }
    server.add_service(sample);

    tracing::debug!(
        sites = config.sites.len(),
        prefixes = ?config.listener.prefixes,
        "Server assembled"
    );
    Ok(server)
}

/// Run until SIGINT/SIGTERM, then dispose the server.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let mut server = build_server(&config)?;
    server.start().await?;

    for prefix in server.bound_prefixes() {
        tracing::info!(prefix = %prefix, "Listening");
    }

    wait_for_signal().await;
    tracing::info!(inflight = server.inflight().len(), "Shutdown signal received");
    server.dispose().await;
    Ok(())
}
