//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1 driver, request span)
//!     → context.rs (request ID, prefix resolution, origin classification)
//!     → cors.rs (preflight / deny / headers)
//!     → observer.rs (may answer the request)
//!     → [routing layer: services then sites]
//!     → response.rs (status, headers, buffered or streamed body)
//!     → Send to client
//! ```

pub mod body;
pub mod context;
pub mod cors;
pub mod inflight;
pub mod observer;
pub mod response;
pub mod server;

pub use body::{BodyError, ByteStream, RequestBody, ResponseBody, DEFAULT_BODY_LIMIT};
pub use context::{current_request_id, RequestContext, RequestId, SERVER_NAME, X_REQUEST_ID};
pub use cors::{CorsPolicy, CorsState, ORIGIN_NOT_ALLOWED};
pub use inflight::{InflightEntry, InflightGuard, InflightRegistry};
pub use observer::{RequestDisposition, ServerObserver, TransportFault};
pub use response::ResponseBuilder;
pub use server::Server;
