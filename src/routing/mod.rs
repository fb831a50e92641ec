//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (request path relative to the server prefix)
//!     → BindingTable (services in order, then sites)
//!     → router.rs (router prefix, first matching descriptor)
//!     → matcher.rs (bare name or URI template, value extraction)
//!     → binder.rs (parameters from extracted values)
//!     → invoke.rs (call handler, encode reply)
//! ```
//!
//! # Design Decisions
//! - Descriptors compiled at registration, immutable at runtime
//! - Deterministic: declaration order decides between overlapping patterns
//! - First binding that claims a request wins; unclaimed requests fall through

pub mod binder;
pub mod call;
pub mod contract;
mod invoke;
pub mod matcher;
pub mod router;
pub mod shape;

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::context::RequestContext;

pub use binder::{BindingError, Extracted};
pub use call::{Arg, Args, Call, Fault, Reply, RequestInfo};
pub use contract::{ContractDescriptor, Operation, Param, Returns, Signature, ValueType};
pub use matcher::{ExtractedValues, PatternError, UriPattern};
pub use router::ServiceBinding;
pub use shape::{Field, Record, RecordKind, RecordShape, ShapeRegistry};

/// Something that may claim and answer a request.
pub trait Binding: Send + Sync {
    /// Answer `ctx` and return `true`, or leave it untouched and return `false`.
    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, bool>;
}

/// Ordered bindings. Services are tried before sites.
#[derive(Clone, Default)]
pub struct BindingTable {
    services: Vec<Arc<dyn Binding>>,
    sites: Vec<Arc<dyn Binding>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(&mut self, binding: Arc<dyn Binding>) {
        self.services.push(binding);
    }

    pub fn add_site(&mut self, binding: Arc<dyn Binding>) {
        self.sites.push(binding);
    }

    pub fn len(&self) -> usize {
        self.services.len() + self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `ctx` to every binding in order. Returns whether one claimed it.
    pub async fn dispatch(&self, ctx: &mut RequestContext) -> bool {
        for binding in self.services.iter().chain(self.sites.iter()) {
            if binding.process(ctx).await {
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingTable")
            .field("services", &self.services.len())
            .field("sites", &self.sites.len())
            .finish()
    }
}
