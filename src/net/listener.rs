//! TCP endpoints and the fan-out accept loop.
//!
//! # Responsibilities
//! - Group server prefixes into bindable endpoints
//! - Bind each endpoint once, rewriting ephemeral ports
//! - Run `fan_out` concurrent accept tasks per endpoint until shutdown
//! - Report accept errors without stopping the loop

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::lifecycle::shutdown::Shutdown;
use crate::net::prefix::{HostPattern, ServerPrefix};

/// Pause after a failed accept, so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("invalid prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("no prefixes configured")]
    NoPrefixes,

    #[error("failed to bind {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server has been disposed")]
    Disposed,
}

/// A bound socket and the prefixes it serves.
#[derive(Debug, Clone)]
pub struct Endpoint {
    listener: Arc<TcpListener>,
    local_addr: SocketAddr,
    prefixes: Vec<ServerPrefix>,
}

impl Endpoint {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Prefixes served here, with ephemeral ports replaced by the bound port.
    pub fn prefixes(&self) -> &[ServerPrefix] {
        &self.prefixes
    }
}

/// Bind every prefix.
///
/// Prefixes sharing a port share a socket. A wildcard host on a port makes
/// that port bind `0.0.0.0` for all of its prefixes.
pub async fn bind(prefixes: &[ServerPrefix]) -> Result<Vec<Endpoint>, BindError> {
    if prefixes.is_empty() {
        return Err(BindError::NoPrefixes);
    }

    let mut groups: Vec<(String, u16, Vec<ServerPrefix>)> = Vec::new();
    for prefix in prefixes {
        let wildcard = prefixes
            .iter()
            .any(|other| other.port() == prefix.port() && *other.host() == HostPattern::Any);
        let host = if wildcard { "0.0.0.0" } else { prefix.bind_host() };

        match groups
            .iter_mut()
            .find(|(h, port, _)| h.as_str() == host && *port == prefix.port())
        {
            Some((_, _, members)) => members.push(prefix.clone()),
            None => groups.push((host.to_owned(), prefix.port(), vec![prefix.clone()])),
        }
    }

    let mut endpoints = Vec::with_capacity(groups.len());
    for (host, port, members) in groups {
        let address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let io_error = |source: io::Error| BindError::Io {
            address: address.clone(),
            source,
        };

        let listener = TcpListener::bind((host.as_str(), port)).await.map_err(io_error)?;
        let local_addr = listener.local_addr().map_err(io_error)?;

        let prefixes = members
            .into_iter()
            .map(|prefix| {
                if prefix.port() == 0 {
                    prefix.with_port(local_addr.port())
                } else {
                    prefix
                }
            })
            .collect::<Vec<_>>();

        tracing::info!(
            address = %local_addr,
            prefixes = ?prefixes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Listener bound"
        );

        endpoints.push(Endpoint {
            listener: Arc::new(listener),
            local_addr,
            prefixes,
        });
    }
    Ok(endpoints)
}

/// Receives what the accept loops produce.
pub trait Acceptor: Send + Sync + 'static {
    /// Take ownership of an accepted connection. Must not block; spawn instead.
    fn on_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr, local: SocketAddr);

    fn on_accept_error(&self, local: SocketAddr, error: io::Error);
}

/// Start `fan_out` accept tasks on each endpoint.
///
/// Tasks exit once `shutdown` triggers; an accept that already completed is
/// still handed to the acceptor.
pub fn spawn_acceptors<A: Acceptor>(
    endpoints: &[Endpoint],
    fan_out: usize,
    acceptor: Arc<A>,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let fan_out = fan_out.max(1);
    let mut handles = Vec::with_capacity(endpoints.len() * fan_out);

    for endpoint in endpoints {
        for slot in 0..fan_out {
            let listener = Arc::clone(&endpoint.listener);
            let local = endpoint.local_addr;
            let acceptor = Arc::clone(&acceptor);
            let mut signal = shutdown.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = signal.recv() => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, peer)) => {
                                tracing::trace!(peer = %peer, local = %local, slot, "Connection accepted");
                                Arc::clone(&acceptor).on_connection(stream, peer, local);
                            }
                            Err(error) => {
                                acceptor.on_accept_error(local, error);
                                tokio::time::sleep(ACCEPT_BACKOFF).await;
                            }
                        },
                    }
                }
                tracing::trace!(local = %local, slot, "Accept task stopped");
            }));
        }
    }
    handles
}
