//! Batch outcome types.

use serde::{Deserialize, Serialize};

use crate::id::WorkItemId;

/// Outcome of one item in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Item id
    pub id: WorkItemId,
    /// Whether the operation succeeded
    pub success: bool,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of a batch run.
///
/// `succeeded` and `failed` each keep the order in which items were
/// submitted, and `succeeded.len() + failed.len() == total`. Items that
/// were never attempted because the run stopped early are counted in
/// `skipped`, not in `total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult<T> {
    /// Successful items with their results
    pub succeeded: Vec<(WorkItemId, T)>,
    /// Failed items with their error messages
    pub failed: Vec<(WorkItemId, String)>,
    /// Per-item outcomes in submission order
    pub outcomes: Vec<BatchItemResult>,
    /// Items attempted
    pub total: usize,
    /// Items that succeeded
    pub success_count: usize,
    /// Items that failed
    pub failure_count: usize,
    /// Items never attempted
    pub skipped: usize,
    /// Whether stop-on-error halted the run
    pub stopped_early: bool,
}

impl<T> BatchResult<T> {
    /// Create an empty result.
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            outcomes: Vec::new(),
            total: 0,
            success_count: 0,
            failure_count: 0,
            skipped: 0,
            stopped_early: false,
        }
    }

    /// Record a success.
    pub fn record_success(&mut self, id: WorkItemId, value: T) {
        self.succeeded.push((id, value));
        self.outcomes.push(BatchItemResult {
            id,
            success: true,
            error: None,
        });
        self.total += 1;
        self.success_count += 1;
    }

    /// Record a failure.
    pub fn record_failure(&mut self, id: WorkItemId, error: impl Into<String>) {
        let error = error.into();
        self.outcomes.push(BatchItemResult {
            id,
            success: false,
            error: Some(error.clone()),
        });
        self.failed.push((id, error));
        self.total += 1;
        self.failure_count += 1;
    }

    /// Whether every attempted item succeeded and nothing was skipped.
    pub fn is_complete_success(&self) -> bool {
        self.failure_count == 0 && self.skipped == 0
    }

    /// Ids of succeeded items in submission order.
    pub fn succeeded_ids(&self) -> Vec<WorkItemId> {
        self.succeeded.iter().map(|(id, _)| *id).collect()
    }

    /// Ids of failed items in submission order.
    pub fn failed_ids(&self) -> Vec<WorkItemId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }

    /// Progress snapshot against the number of submitted items.
    pub fn progress(&self, submitted: usize) -> BatchProgress {
        BatchProgress {
            completed: self.total,
            total: submitted,
            succeeded: self.success_count,
            failed: self.failure_count,
        }
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress reported after each wave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Items finished so far
    pub completed: usize,
    /// Items submitted
    pub total: usize,
    /// Successes so far
    pub succeeded: usize,
    /// Failures so far
    pub failed: usize,
}
