//! Per-request context.
//!
//! # Responsibilities
//! - Identify the request (`RequestId`) and expose it task-locally
//! - Resolve the server prefix the request was addressed to
//! - Compute router-relative paths (`resolve_local_prefix`)
//! - Classify CORS-relevant properties once
//! - Own the inbound body and the outbound [`ResponseBuilder`]
//!
//! # Design Decisions
//! - The context is passed explicitly as `&mut RequestContext` through every stage
//! - The task-local id is for code that cannot receive the context (logging, hooks)

use std::fmt;
use std::future::Future;
use std::mem;

use http::header::{HeaderName, HOST, ORIGIN, SERVER};
use http::{HeaderMap, Method, Request, Response, Uri};
use uuid::Uuid;

use crate::http::body::{RequestBody, ResponseBody, DEFAULT_BODY_LIMIT};
use crate::http::response::ResponseBuilder;
use crate::net::prefix::{split_authority, ServerPrefix};
use crate::routing::call::RequestInfo;

/// Value of the `Server` header on every claimed response.
pub const SERVER_NAME: &str = concat!("contract-host/", env!("CARGO_PKG_VERSION"));

pub const X_REQUEST_ID: &str = "x-request-id";

tokio::task_local! {
    static CURRENT_REQUEST: RequestId;
}

/// Unique identifier of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Id of the request the current task is handling, if any.
pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST.try_with(|id| *id).ok()
}

/// Run `future` with `id` as the current request.
pub(crate) async fn with_request_id<F: Future>(id: RequestId, future: F) -> F::Output {
    CURRENT_REQUEST.scope(id, future).await
}

/// Everything known about one request while it is dispatched.
pub struct RequestContext {
    id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
    authority: Option<(String, u16)>,
    request_path: Option<String>,
    origin: Option<String>,
    is_preflight: bool,
    expose_error_details: bool,
    body_limit: usize,
    response: ResponseBuilder,
}

impl RequestContext {
    /// Build a context, matching the request against `prefixes` in order.
    pub fn new(request: Request<RequestBody>, prefixes: &[ServerPrefix]) -> Self {
        let (parts, body) = request.into_parts();

        let authority = parts
            .headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map(str::to_owned)
            .or_else(|| parts.uri.authority().map(|a| a.as_str().to_owned()))
            .and_then(|raw| {
                split_authority(&raw).map(|(host, port)| (host.to_ascii_lowercase(), port.unwrap_or(80)))
            });

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let request_path = authority.as_ref().and_then(|(host, port)| {
            prefixes
                .iter()
                .find_map(|prefix| prefix.strip(host, *port, path_and_query))
        });

        let origin = parts
            .headers
            .get(ORIGIN)
            .and_then(|origin| origin.to_str().ok())
            .map(str::to_owned);
        let is_preflight = origin.is_some() && parts.method == Method::OPTIONS;

        Self {
            id: RequestId::new(),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            authority,
            request_path,
            origin,
            is_preflight,
            expose_error_details: false,
            body_limit: DEFAULT_BODY_LIMIT,
            response: ResponseBuilder::new(),
        }
    }

    /// Include error messages in 400 responses.
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    /// Largest body a binding may buffer.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Path and query relative to the matched server prefix; `None` if no prefix matched.
    pub fn request_path(&self) -> Option<&str> {
        self.request_path.as_deref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn is_origin_present(&self) -> bool {
        self.origin.is_some()
    }

    pub fn is_preflight(&self) -> bool {
        self.is_preflight
    }

    pub fn expose_error_details(&self) -> bool {
        self.expose_error_details
    }

    /// Serialized origin of the request itself, e.g. `http://a.test:8080`.
    pub fn request_origin(&self) -> Option<String> {
        let (host, port) = self.authority.as_ref()?;
        let url = url::Url::parse(&format!("http://{host}:{port}/")).ok()?;
        Some(url.origin().ascii_serialization())
    }

    /// Path remaining after the server prefix and `prefix`.
    ///
    /// Returns `""` when the path equals the prefix, `"/"` when it equals the
    /// prefix plus a separator, and `None` when the path is not under `prefix`.
    pub fn resolve_local_prefix(&self, prefix: &str) -> Option<String> {
        let path = self.request_path.as_deref()?;
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return Some(path.to_owned());
        }

        let rest = path.strip_prefix('/').unwrap_or(path);
        let head = rest.get(..prefix.len())?;
        if !head.eq_ignore_ascii_case(prefix) {
            return None;
        }
        let tail = &rest[prefix.len()..];
        if tail.is_empty() || tail.starts_with('/') || tail.starts_with('?') {
            Some(tail.to_owned())
        } else {
            None
        }
    }

    pub fn response(&self) -> &ResponseBuilder {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseBuilder {
        &mut self.response
    }

    /// Take the inbound body, leaving it empty.
    pub fn take_body(&mut self) -> RequestBody {
        mem::take(&mut self.body)
    }

    /// Snapshot handed to operation handlers.
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            id: self.id,
            method: self.method.clone(),
            path: self.request_path.clone().unwrap_or_default(),
            headers: self.headers.clone(),
        }
    }

    /// Mark the request as claimed by a binding.
    pub(crate) fn claim(&mut self) {
        self.response.set_header(SERVER, SERVER_NAME);
        self.response
            .set_header(HeaderName::from_static(X_REQUEST_ID), &self.id.to_string());
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        self.response.into_response()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("request_path", &self.request_path)
            .field("origin", &self.origin)
            .field("is_preflight", &self.is_preflight)
            .finish_non_exhaustive()
    }
}
