//! Remote work-item repository collaborator.

use async_trait::async_trait;
use workbulk_core::WorkItemId;
use workbulk_execution::RemoteError;

use crate::operation::BulkOperation;

/// Applies a rendered operation to one remote work item.
///
/// Implementations own transport concerns (authentication, per-call
/// timeouts, rate limiting). Retrying is the caller's job; an
/// implementation reports each failure once, classified.
#[async_trait]
pub trait WorkItemRepository: Send + Sync {
    /// Apply `operation` to item `id`, returning the service's response.
    async fn apply(
        &self,
        id: WorkItemId,
        operation: &BulkOperation,
    ) -> Result<serde_json::Value, RemoteError>;
}
