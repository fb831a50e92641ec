//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Server prefixes
//!     → prefix.rs (parse, host/port/path)
//!     → listener.rs (bind endpoints, fan-out accept loops)
//!     → connection.rs (open-connection tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Accepting is bounded by the fan-out; each connection gets its own task
//! - Each connection tracked for metrics and shutdown

pub mod connection;
pub mod listener;
pub mod prefix;

pub use listener::{BindError, Endpoint};
pub use prefix::{HostPattern, ServerPrefix};
