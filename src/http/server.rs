//! HTTP server: registration surface, lifecycle and per-request dispatch.
//!
//! # Responsibilities
//! - Collect service and site bindings, CORS policy and observer
//! - Bind the configured prefixes and run the accept fan-out
//! - Serve each connection with hyper's HTTP/1 driver
//! - Drive each request: context → CORS → observer → bindings → 404
//! - Observability (request span, metrics, in-flight registry)
//!
//! # Design Decisions
//! - Registration is snapshotted on `start`; changes apply on the next start
//! - `stop` closes the endpoints and lets dispatched requests finish
//! - A panic while dispatching answers 500 for that request only

use std::convert::Infallible;
use std::mem;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::{CorsConfig, ServerConfig};
use crate::http::body::{RequestBody, ResponseBody, DEFAULT_BODY_LIMIT};
use crate::http::context::{with_request_id, RequestContext};
use crate::http::cors::CorsPolicy;
use crate::http::inflight::InflightRegistry;
use crate::http::observer::{RequestDisposition, ServerObserver, TransportFault};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{self, Acceptor, BindError, Endpoint};
use crate::net::prefix::ServerPrefix;
use crate::observability::metrics;
use crate::routing::{BindingTable, ServiceBinding};
use crate::site::SiteBinding;

const DEFAULT_FAN_OUT: usize = 16;

enum State {
    Idle,
    Running(Running),
    Disposed,
}

struct Running {
    shutdown: Shutdown,
    endpoints: Vec<Endpoint>,
    acceptors: Vec<JoinHandle<()>>,
}

/// An embedded HTTP server dispatching to registered bindings.
pub struct Server {
    prefixes: Vec<String>,
    bindings: BindingTable,
    cors: CorsPolicy,
    observer: Option<Arc<dyn ServerObserver>>,
    max_concurrent_requests: usize,
    expose_error_details: bool,
    max_body_bytes: usize,
    inflight: InflightRegistry,
    connections: ConnectionTracker,
    state: State,
}

impl Server {
    /// A server answering on `prefixes`, e.g. `http://+:8080/api/`.
    ///
    /// Prefixes are parsed by [`start`](Server::start).
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            bindings: BindingTable::new(),
            cors: CorsPolicy::default(),
            observer: None,
            max_concurrent_requests: DEFAULT_FAN_OUT,
            expose_error_details: cfg!(debug_assertions),
            max_body_bytes: DEFAULT_BODY_LIMIT,
            inflight: InflightRegistry::new(),
            connections: ConnectionTracker::new(),
            state: State::Idle,
        }
    }

    /// Listener, CORS, dispatch and site settings from `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut server = Self::new(config.listener.prefixes.iter().cloned());
        server
            .set_cors(config.cors.clone())
            .set_max_concurrent_requests(config.listener.max_concurrent_requests)
            .set_expose_error_details(config.dispatch.expose_error_details)
            .set_max_body_bytes(config.dispatch.max_body_bytes);
        for site in &config.sites {
            server.add_site(SiteBinding::from_config(site));
        }
        server
    }

    pub fn add_service<S: Send + Sync + 'static>(&mut self, binding: ServiceBinding<S>) -> &mut Self {
        self.bindings.add_service(Arc::new(binding));
        self
    }

    pub fn add_site(&mut self, binding: SiteBinding) -> &mut Self {
        self.bindings.add_site(Arc::new(binding));
        self
    }

    pub fn set_cors(&mut self, config: CorsConfig) -> &mut Self {
        self.cors = CorsPolicy::from_config(&config);
        self
    }

    /// Concurrent accept tasks per endpoint.
    pub fn set_max_concurrent_requests(&mut self, fan_out: usize) -> &mut Self {
        self.max_concurrent_requests = fan_out.max(1);
        self
    }

    pub fn set_observer(&mut self, observer: impl ServerObserver + 'static) -> &mut Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Send error messages in 400 bodies instead of "Bad Request".
    pub fn set_expose_error_details(&mut self, expose: bool) -> &mut Self {
        self.expose_error_details = expose;
        self
    }

    /// Largest request body buffered for binding; larger bodies get 413.
    pub fn set_max_body_bytes(&mut self, limit: usize) -> &mut Self {
        self.max_body_bytes = limit;
        self
    }

    /// Bind every prefix and start accepting. Does nothing if already running.
    pub async fn start(&mut self) -> Result<(), BindError> {
        match self.state {
            State::Disposed => return Err(BindError::Disposed),
            State::Running(_) => return Ok(()),
            State::Idle => {}
        }

        let prefixes = self
            .prefixes
            .iter()
            .map(|raw| raw.parse::<ServerPrefix>())
            .collect::<Result<Vec<_>, _>>()?;
        let endpoints = listener::bind(&prefixes).await?;
        let bound: Vec<ServerPrefix> = endpoints
            .iter()
            .flat_map(|endpoint| endpoint.prefixes().iter().cloned())
            .collect();

        let shutdown = Shutdown::new();
        let dispatcher = Arc::new(Dispatcher {
            prefixes: bound,
            bindings: self.bindings.clone(),
            cors: self.cors.clone(),
            observer: self.observer.clone(),
            inflight: self.inflight.clone(),
            connections: self.connections.clone(),
            expose_error_details: self.expose_error_details,
            max_body_bytes: self.max_body_bytes,
            shutdown: shutdown.subscribe(),
        });
        let acceptors =
            listener::spawn_acceptors(&endpoints, self.max_concurrent_requests, dispatcher, &shutdown);

        tracing::info!(
            endpoints = endpoints.len(),
            fan_out = self.max_concurrent_requests,
            bindings = self.bindings.len(),
            "Server started"
        );
        self.state = State::Running(Running {
            shutdown,
            endpoints,
            acceptors,
        });
        Ok(())
    }

    /// Stop accepting and close the endpoints. Requests already dispatched
    /// run to completion; idle connections are closed.
    pub async fn stop(&mut self) {
        if !matches!(self.state, State::Running(_)) {
            return;
        }
        let State::Running(running) = mem::replace(&mut self.state, State::Idle) else {
            return;
        };

        running.shutdown.trigger();
        for acceptor in running.acceptors {
            if let Err(error) = acceptor.await {
                tracing::error!(error = %error, "Accept task failed");
            }
        }
        drop(running.endpoints);
        tracing::info!(inflight = self.inflight.len(), "Server stopped");
    }

    /// Stop if running and refuse further starts.
    pub async fn dispose(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.stop().await;
        self.state = State::Disposed;
        tracing::debug!("Server disposed");
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, State::Disposed)
    }

    /// Bound socket addresses while running.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        match &self.state {
            State::Running(running) => running.endpoints.iter().map(Endpoint::local_addr).collect(),
            _ => Vec::new(),
        }
    }

    /// Prefixes with ephemeral ports resolved, while running.
    pub fn bound_prefixes(&self) -> Vec<ServerPrefix> {
        match &self.state {
            State::Running(running) => running
                .endpoints
                .iter()
                .flat_map(|endpoint| endpoint.prefixes().iter().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn inflight(&self) -> &InflightRegistry {
        &self.inflight
    }

    pub fn open_connections(&self) -> u64 {
        self.connections.open_count()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let State::Running(running) = &self.state {
            running.shutdown.trigger();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("prefixes", &self.prefixes)
            .field("bindings", &self.bindings)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Shared by every connection of one run.
struct Dispatcher {
    prefixes: Vec<ServerPrefix>,
    bindings: BindingTable,
    cors: CorsPolicy,
    observer: Option<Arc<dyn ServerObserver>>,
    inflight: InflightRegistry,
    connections: ConnectionTracker,
    expose_error_details: bool,
    max_body_bytes: usize,
    shutdown: ShutdownSignal,
}

impl Acceptor for Dispatcher {
    fn on_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr, local: SocketAddr) {
        let guard = self.connections.track();
        let mut shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let dispatcher = Arc::clone(&self);
            let service = service_fn(move |request: Request<Incoming>| {
                let dispatcher = Arc::clone(&dispatcher);
                async move { Ok::<_, Infallible>(dispatcher.handle(request.map(RequestBody::from)).await) }
            });

            let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(connection);

            let result = tokio::select! {
                result = connection.as_mut() => result,
                _ = shutdown.recv() => {
                    connection.as_mut().graceful_shutdown();
                    connection.as_mut().await
                }
            };
            if let Err(error) = result {
                tracing::debug!(
                    connection_id = %guard.id(),
                    peer = %peer,
                    local = %local,
                    error = %error,
                    "Connection ended with error"
                );
            }
            drop(guard);
        });
    }

    fn on_accept_error(&self, local: SocketAddr, error: std::io::Error) {
        tracing::warn!(local = %local, error = %error, "Accept failed");
        metrics::record_transport_fault();
        if let Some(observer) = &self.observer {
            observer.on_transport_fault(&TransportFault {
                endpoint: local,
                error,
            });
        }
    }
}

impl Dispatcher {
    async fn handle(&self, request: Request<RequestBody>) -> Response<ResponseBody> {
        let started = Instant::now();
        let mut ctx = RequestContext::new(request, &self.prefixes)
            .with_error_details(self.expose_error_details)
            .with_body_limit(self.max_body_bytes);
        let _inflight = self.inflight.enter(&ctx);

        let span = tracing::info_span!(
            "request",
            id = %ctx.id(),
            method = %ctx.method(),
            path = %ctx.uri().path(),
        );
        let id = ctx.id();
        let method = ctx.method().to_string();

        with_request_id(id, self.dispatch(&mut ctx).instrument(span)).await;

        let status = ctx.response().status().as_u16();
        metrics::record_request(&method, status, started);
        ctx.into_response()
    }

    async fn dispatch(&self, ctx: &mut RequestContext) {
        if ctx.is_origin_present() {
            let state = self.cors.negotiate(ctx);
            if state.is_terminal() {
                tracing::debug!(cors = ?state, "CORS answered request");
                return;
            }
        }

        if let Some(observer) = &self.observer {
            if observer.on_request(ctx) == RequestDisposition::Handled {
                ctx.response_mut().close();
                return;
            }
        }

        match AssertUnwindSafe(self.bindings.dispatch(ctx)).catch_unwind().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(path = ?ctx.request_path(), "No binding claimed request");
                let response = ctx.response_mut();
                response.set_status(StatusCode::NOT_FOUND);
                response.close();
            }
            Err(_) => {
                tracing::error!("Binding panicked while dispatching");
                let response = ctx.response_mut();
                response.clear_body();
                response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                response.close();
            }
        }
        tracing::debug!(status = ctx.response().status().as_u16(), "Request dispatched");
    }
}
