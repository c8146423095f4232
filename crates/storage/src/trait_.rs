//! Handle store trait abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use workbulk_core::{Handle, ItemContext, QueryKind, ResultSet, ResultSetSummary, Time, WorkItemId};

/// Error type for handle store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while storing or resolving handles.
///
/// `HandleNotFound` and `HandleExpired` are deliberately distinct: the
/// first means the handle never resolved (or was invalidated), the
/// second that it did resolve until its TTL ran out.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Never issued, or explicitly invalidated
    #[error("handle '{0}' not found; run the query again to obtain a new handle")]
    HandleNotFound(Handle),

    /// Issued, but its TTL has passed
    #[error("handle '{handle}' expired at {expired_at}; re-issue the query to refresh it")]
    HandleExpired {
        /// The expired handle
        handle: Handle,
        /// When it expired
        expired_at: Time,
    },

    /// Rejected store request
    #[error("invalid result set: {0}")]
    Validation(String),
}

/// Request to capture a query result under a new handle.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    /// Item ids in query order
    pub ids: Vec<WorkItemId>,
    /// Query text
    pub query: String,
    /// Query language
    pub query_kind: QueryKind,
    /// Lifetime; the store default applies when unset
    pub ttl: Option<Duration>,
    /// Per-item snapshots
    pub context: HashMap<WorkItemId, ItemContext>,
    /// Opaque analysis output
    pub analysis: Option<serde_json::Value>,
}

impl StoreQuery {
    /// Create a request with no context.
    pub fn new(
        ids: impl IntoIterator<Item = WorkItemId>,
        query: impl Into<String>,
        query_kind: QueryKind,
    ) -> Self {
        Self {
            ids: ids.into_iter().collect(),
            query: query.into(),
            query_kind,
            ttl: None,
            context: HashMap::new(),
            analysis: None,
        }
    }

    /// Set lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set lifetime in milliseconds.
    pub fn with_ttl_ms(self, ttl_ms: u64) -> Self {
        self.with_ttl(Duration::from_millis(ttl_ms))
    }

    /// Replace all item contexts.
    pub fn with_context(mut self, context: HashMap<WorkItemId, ItemContext>) -> Self {
        self.context = context;
        self
    }

    /// Add one item context.
    pub fn with_item_context(mut self, id: WorkItemId, context: ItemContext) -> Self {
        self.context.insert(id, context);
        self
    }

    /// Attach analysis output.
    pub fn with_analysis(mut self, analysis: serde_json::Value) -> Self {
        self.analysis = Some(analysis);
        self
    }
}

/// Counters over the store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Entries still resolvable
    pub live: usize,
    /// Entries past their TTL but not yet swept
    pub expired: usize,
    /// Items across live entries
    pub live_items: usize,
    /// Handles remembered as retired so they are never reissued
    pub retired: usize,
}

/// Expiring store from handle to result set.
///
/// Implementations must be safe under concurrent calls. Readers receive a
/// shared snapshot, so evictions never tear an in-flight read.
#[async_trait]
pub trait HandleStore: Send + Sync {
    /// Capture a result set and mint a handle for it.
    async fn store_query(&self, request: StoreQuery) -> Result<Handle>;

    /// Resolve a handle.
    async fn get(&self, handle: &Handle) -> Result<Arc<ResultSet>>;

    /// Summaries of stored sets, oldest first.
    async fn list(&self, include_expired: bool) -> Vec<ResultSetSummary>;

    /// Evict a handle early. Returns whether anything was removed.
    async fn invalidate(&self, handle: &Handle) -> bool;

    /// Remove every expired entry and forget retirement records older than
    /// the retention window. Returns how many live entries were removed.
    async fn sweep_expired(&self) -> usize;

    /// Current counters.
    async fn stats(&self) -> StoreStats;

    /// Drop every entry.
    async fn clear(&self);
}
