//! Workbulk core data models.
//!
//! This crate defines the data structures shared by the handle store,
//! the selection engine and the batch executor. It performs no I/O.

#![warn(missing_docs)]

// Identities
mod id;

// Captured query results
mod result_set;

// Selection input
mod selector;

// Batch outcomes
mod batch;

// Re-exports
pub use id::{Handle, WorkItemId};
pub use result_set::{ItemContext, QueryKind, ResultSet, ResultSetSummary};
pub use selector::{SelectionCriteria, Selector, SelectorError};
pub use batch::{BatchItemResult, BatchProgress, BatchResult};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
