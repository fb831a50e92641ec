//! Server observer hooks.

use std::io;
use std::net::SocketAddr;

use crate::http::context::RequestContext;

/// Outcome of [`ServerObserver::on_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDisposition {
    /// Continue with routing.
    #[default]
    Continue,
    /// The observer produced the response; skip routing.
    Handled,
}

/// A low-level accept failure.
#[derive(Debug)]
pub struct TransportFault {
    /// Local endpoint that failed to accept.
    pub endpoint: SocketAddr,
    pub error: io::Error,
}

/// Callbacks delivered by the server.
///
/// Both methods run on the dispatching task and must not block.
pub trait ServerObserver: Send + Sync {
    /// Called after CORS negotiation and before routing.
    fn on_request(&self, _ctx: &mut RequestContext) -> RequestDisposition {
        RequestDisposition::Continue
    }

    /// Called when accepting a connection fails. The accept loop keeps running.
    fn on_transport_fault(&self, _fault: &TransportFault) {}
}
