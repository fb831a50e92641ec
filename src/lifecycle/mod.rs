//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Server with sample service and sites → start()
//!
//! Shutdown (shutdown.rs):
//!     trigger() → accept tasks stop → idle connections close
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller disposes the server
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then bindings, then listeners
//! - Stop never preempts requests already dispatched

pub mod shutdown;
pub mod signals;
pub mod startup;
