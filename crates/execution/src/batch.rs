//! Bounded-concurrency batch execution.
//!
//! Items are processed in consecutive waves of at most `concurrency`
//! items. Every item of a wave runs concurrently, and the next wave starts
//! only after the whole wave has settled, so no more than `concurrency`
//! operations are ever outstanding.

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use workbulk_core::{BatchProgress, BatchResult, WorkItemId};

use crate::selector::SelectedItem;

/// Default number of items per wave.
pub const DEFAULT_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

/// Batch execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per wave
    pub concurrency: NonZeroUsize,
    /// Stop starting new waves once an item fails
    pub stop_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            stop_on_error: false,
        }
    }
}

impl BatchConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set wave width.
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set stop-on-error.
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

/// Something a batch can report an id for.
pub trait BatchItem {
    /// Id recorded in the batch result.
    fn item_id(&self) -> WorkItemId;
}

impl BatchItem for WorkItemId {
    fn item_id(&self) -> WorkItemId {
        *self
    }
}

impl BatchItem for SelectedItem {
    fn item_id(&self) -> WorkItemId {
        self.id
    }
}

/// Applies an operation to many items under bounded concurrency.
///
/// Holds no state between calls. A failing item never affects its
/// siblings; failures are collected into the returned [`BatchResult`].
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    /// Create an executor.
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run `operation` over `items`.
    pub async fn execute<I, T, E, F, Fut>(&self, items: &[I], operation: F) -> BatchResult<T>
    where
        I: BatchItem,
        F: Fn(&I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_progress(items, operation, |_| {}).await
    }

    /// Run `operation` over `items`, calling `on_progress` after each wave.
    pub async fn execute_with_progress<I, T, E, F, Fut, P>(
        &self,
        items: &[I],
        operation: F,
        on_progress: P,
    ) -> BatchResult<T>
    where
        I: BatchItem,
        F: Fn(&I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(BatchProgress),
    {
        let submitted = items.len();
        let width = self.config.concurrency.get();
        let operation = &operation;
        let mut result = BatchResult::new();

        for (index, wave) in items.chunks(width).enumerate() {
            debug!(wave = index + 1, size = wave.len(), "Starting wave");

            // Calling the operation inside the async block defers any
            // synchronous work (and panics) into the guarded future.
            let outcomes = join_all(
                wave.iter()
                    .map(|item| AssertUnwindSafe(async move { operation(item).await }).catch_unwind()),
            )
            .await;

            let mut wave_failed = false;
            for (item, outcome) in wave.iter().zip(outcomes) {
                let id = item.item_id();
                match outcome {
                    Ok(Ok(value)) => result.record_success(id, value),
                    Ok(Err(err)) => {
                        wave_failed = true;
                        debug!(item = %id, error = %err, "Item failed");
                        result.record_failure(id, err.to_string());
                    }
                    Err(panic) => {
                        wave_failed = true;
                        let message = panic_message(panic.as_ref());
                        warn!(item = %id, panic = %message, "Item operation panicked");
                        result.record_failure(id, format!("operation panicked: {}", message));
                    }
                }
            }

            on_progress(result.progress(submitted));
            debug!(
                wave = index + 1,
                completed = result.total,
                failed = result.failure_count,
                "Wave finished"
            );

            if wave_failed && self.config.stop_on_error {
                result.skipped = submitted - result.total;
                result.stopped_early = result.skipped > 0;
                if result.stopped_early {
                    warn!(
                        wave = index + 1,
                        skipped = result.skipped,
                        "Stopping batch after failure"
                    );
                }
                break;
            }
        }

        info!(
            total = result.total,
            succeeded = result.success_count,
            failed = result.failure_count,
            skipped = result.skipped,
            "Batch finished"
        );
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
