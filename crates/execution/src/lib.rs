//! Execution layer - selection, retry and bounded-concurrency batches.

#![warn(missing_docs)]

pub mod selector;
pub mod remote;
pub mod retry;
pub mod batch;

pub use selector::{SelectedItem, SelectionEngine};
pub use remote::RemoteError;
pub use retry::RetryPolicy;
pub use batch::{BatchConfig, BatchExecutor, BatchItem, DEFAULT_CONCURRENCY};
