//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener, dispatcher, bindings
//!     → logging.rs (structured events, one span per request)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - The request id is recorded on the request span, so every event inside carries it
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
