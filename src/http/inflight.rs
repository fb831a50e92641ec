//! In-flight request registry.
//!
//! # Responsibilities
//! - Associate every dispatched request with a registry entry
//! - Remove the association when the request completes, on every exit path
//!
//! # Design Decisions
//! - `DashMap` allows concurrent insert/lookup/remove without a global lock
//! - Removal happens in `Drop`, so errors and panics cannot leak entries

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use http::Method;

use crate::http::context::{RequestContext, RequestId};
use crate::observability::metrics;

/// Snapshot of one in-flight request.
#[derive(Debug, Clone)]
pub struct InflightEntry {
    pub method: Method,
    pub path: Option<String>,
    pub started: Instant,
}

/// Shared table of requests currently being dispatched.
#[derive(Debug, Clone, Default)]
pub struct InflightRegistry {
    entries: Arc<DashMap<RequestId, InflightEntry>>,
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `ctx`. The entry lives as long as the returned guard.
    pub fn enter(&self, ctx: &RequestContext) -> InflightGuard {
        self.entries.insert(
            ctx.id(),
            InflightEntry {
                method: ctx.method().clone(),
                path: ctx.request_path().map(str::to_owned),
                started: Instant::now(),
            },
        );
        metrics::record_inflight(self.entries.len());
        InflightGuard {
            entries: Arc::clone(&self.entries),
            id: ctx.id(),
        }
    }

    pub fn get(&self, id: &RequestId) -> Option<InflightEntry> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Removes its request from the registry when dropped.
#[derive(Debug)]
pub struct InflightGuard {
    entries: Arc<DashMap<RequestId, InflightEntry>>,
    id: RequestId,
}

impl InflightGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.entries.remove(&self.id);
        metrics::record_inflight(self.entries.len());
        tracing::trace!(request_id = %self.id, "Request released");
    }
}
