//! Bulk operation service: handle + selector + batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, warn};

use workbulk_core::{BatchResult, Handle, Selector, SelectorError, Time};
use workbulk_execution::{
    BatchConfig, BatchExecutor, RemoteError, RetryPolicy, SelectedItem, SelectionEngine,
};
use workbulk_storage::{HandleStore, StoreError};

use crate::operation::{BulkOperation, OperationPayload};
use crate::repository::WorkItemRepository;
use crate::template::{self, KNOWN_FIELDS};

/// Bulk operation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Wave width and stop-on-error defaults
    pub batch: BatchConfig,
    /// Retry policy around each remote call
    pub retry: RetryPolicy,
    /// Largest selection a single request may act on
    pub max_batch_size: usize,
    /// Rendered payloads included in a dry-run report
    pub max_preview_items: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            retry: RetryPolicy::default(),
            max_batch_size: 50,
            max_preview_items: 10,
        }
    }
}

impl BulkConfig {
    /// Set batch defaults.
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Set retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set max batch size.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Set preview limit.
    pub fn with_max_preview_items(mut self, max: usize) -> Self {
        self.max_preview_items = max;
        self
    }
}

/// Failures that abort a whole bulk request.
///
/// Per-item failures never surface here; they are reported in the
/// request's [`BatchResult`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BulkError {
    /// Handle never issued or invalidated
    #[error("handle '{0}' not found; run the query again to obtain a new handle")]
    HandleNotFound(Handle),

    /// Handle outlived its TTL
    #[error("handle '{handle}' expired at {expired_at}; re-issue the query to refresh it")]
    HandleExpired {
        /// The expired handle
        handle: Handle,
        /// When it expired
        expired_at: Time,
    },

    /// Malformed request
    #[error("invalid request: {0}")]
    Validation(String),
}

impl From<StoreError> for BulkError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::HandleNotFound(handle) => BulkError::HandleNotFound(handle),
            StoreError::HandleExpired { handle, expired_at } => {
                BulkError::HandleExpired { handle, expired_at }
            }
            StoreError::Validation(message) => BulkError::Validation(message),
        }
    }
}

impl From<SelectorError> for BulkError {
    fn from(err: SelectorError) -> Self {
        BulkError::Validation(err.to_string())
    }
}

/// One bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    /// Handle of the captured result set
    pub handle: Handle,
    /// Which items to act on
    pub selector: Selector,
    /// What to do to them
    pub operation: BulkOperation,
    /// Render only, do not call the repository
    pub dry_run: bool,
    /// Overrides the configured wave width
    pub concurrency: Option<usize>,
    /// Overrides the configured stop-on-error
    pub stop_on_error: Option<bool>,
}

impl BulkRequest {
    /// Create a request with configured defaults.
    pub fn new(handle: Handle, selector: Selector, operation: BulkOperation) -> Self {
        Self {
            handle,
            selector,
            operation,
            dry_run: false,
            concurrency: None,
            stop_on_error: None,
        }
    }

    /// Set dry run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set wave width.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Set stop-on-error.
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = Some(stop_on_error);
        self
    }

    /// Parse a request from tool-call JSON.
    ///
    /// Expected keys: `handle`, `selector`, `operation`, and optionally
    /// `dryRun`, `concurrency`, `stopOnError`.
    pub fn from_value(value: &Value) -> Result<Self, BulkError> {
        let object = value
            .as_object()
            .ok_or_else(|| BulkError::Validation("request must be a JSON object".to_string()))?;

        let handle = object
            .get("handle")
            .and_then(Value::as_str)
            .filter(|handle| !handle.trim().is_empty())
            .ok_or_else(|| BulkError::Validation("'handle' is required".to_string()))?;
        let handle = Handle::from(handle.trim());
        if !handle.is_well_formed() {
            return Err(BulkError::Validation(format!(
                "'{}' is not a handle; pass the handle returned when the query was stored",
                handle
            )));
        }

        let selector = Selector::from_value(object.get("selector").unwrap_or(&Value::Null))?;

        let operation = object
            .get("operation")
            .ok_or_else(|| BulkError::Validation("'operation' is required".to_string()))?;
        let operation: BulkOperation = serde_json::from_value(operation.clone())
            .map_err(|e| BulkError::Validation(format!("invalid operation: {}", e)))?;

        let concurrency = match object.get("concurrency") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| {
                        BulkError::Validation("'concurrency' must be a positive integer".to_string())
                    })?,
            ),
        };

        Ok(Self {
            handle,
            selector,
            operation,
            dry_run: optional_bool(object, "dryRun")?.unwrap_or(false),
            concurrency,
            stop_on_error: optional_bool(object, "stopOnError")?,
        })
    }
}

fn optional_bool(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, BulkError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(BulkError::Validation(format!("'{}' must be a boolean", key))),
    }
}

/// Non-fatal observations attached to a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BulkWarning {
    /// The selector matched nothing
    SelectionEmpty {
        /// Description of the selector
        selector: String,
    },
    /// A placeholder no selected item can fill
    UnknownPlaceholder {
        /// Placeholder name
        name: String,
    },
    /// Stop-on-error left items unattempted
    StoppedEarly {
        /// Items not attempted
        skipped: usize,
    },
}

impl std::fmt::Display for BulkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkWarning::SelectionEmpty { selector } => {
                write!(f, "no items matched {}; nothing was done", selector)
            }
            BulkWarning::UnknownPlaceholder { name } => {
                write!(f, "placeholder '{{{{{}}}}}' matches no captured field and renders empty", name)
            }
            BulkWarning::StoppedEarly { skipped } => {
                write!(f, "stopped after a failure; {} items were not attempted", skipped)
            }
        }
    }
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    /// Handle acted on
    pub handle: Handle,
    /// Operation name
    pub operation: String,
    /// Description of the selection
    pub selection: String,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Items the selector matched
    pub selected_count: usize,
    /// Per-item outcomes; in a dry run each value is the rendered payload
    pub result: BatchResult<Value>,
    /// First rendered payloads (dry run only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub previews: Vec<OperationPayload>,
    /// Non-fatal observations
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BulkWarning>,
}

impl BulkReport {
    /// One-line summary.
    pub fn summary(&self) -> String {
        if self.dry_run {
            format!(
                "dry run: {} would be applied to {} items ({})",
                self.operation, self.selected_count, self.selection
            )
        } else {
            format!(
                "{}: {} succeeded, {} failed, {} skipped of {} selected",
                self.operation,
                self.result.success_count,
                self.result.failure_count,
                self.result.skipped,
                self.selected_count
            )
        }
    }
}

/// Runs bulk operations against result sets addressed by handle.
pub struct BulkOperationManager<S: ?Sized, R: ?Sized> {
    store: Arc<S>,
    repository: Arc<R>,
    engine: SelectionEngine,
    config: BulkConfig,
}

impl<S, R> BulkOperationManager<S, R>
where
    S: HandleStore + ?Sized,
    R: WorkItemRepository + ?Sized,
{
    /// Create a manager with default configuration.
    pub fn new(store: Arc<S>, repository: Arc<R>) -> Self {
        Self {
            store,
            repository,
            engine: SelectionEngine::new(),
            config: BulkConfig::default(),
        }
    }

    /// Set configuration.
    pub fn with_config(mut self, config: BulkConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// The underlying handle store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve a selector without acting on the items.
    pub async fn select(
        &self,
        handle: &Handle,
        selector: &Selector,
    ) -> Result<Vec<SelectedItem>, BulkError> {
        selector.validate()?;
        let set = self.store.get(handle).await?;
        Ok(self.engine.resolve(&set, selector))
    }

    /// Execute (or preview) a bulk request.
    ///
    /// Fails only on a bad handle or a malformed request, before any item
    /// is touched. Otherwise a report is returned even if every item
    /// failed.
    pub async fn run(&self, request: BulkRequest) -> Result<BulkReport, BulkError> {
        request.operation.validate().map_err(BulkError::Validation)?;
        request.selector.validate()?;
        let batch_config = self.batch_config(&request)?;

        let set = self.store.get(&request.handle).await?;
        let items = self.engine.resolve(&set, &request.selector);
        let selection = self.engine.describe(&request.selector);

        let mut report = BulkReport {
            handle: request.handle.clone(),
            operation: request.operation.name().to_string(),
            selection,
            dry_run: request.dry_run,
            selected_count: items.len(),
            result: BatchResult::new(),
            previews: Vec::new(),
            warnings: Vec::new(),
        };

        if items.is_empty() {
            warn!(handle = %request.handle, selection = %report.selection, "Selection is empty");
            report.warnings.push(BulkWarning::SelectionEmpty {
                selector: report.selection.clone(),
            });
            return Ok(report);
        }

        if items.len() > self.config.max_batch_size {
            return Err(BulkError::Validation(format!(
                "selection has {} items but at most {} may be processed per request; \
                 narrow the selector or split the work with indices",
                items.len(),
                self.config.max_batch_size
            )));
        }

        report.warnings.extend(unknown_placeholders(&request.operation, &items));

        info!(
            handle = %request.handle,
            operation = request.operation.name(),
            items = items.len(),
            dry_run = request.dry_run,
            concurrency = batch_config.concurrency.get(),
            "Running bulk operation"
        );

        let operation = &request.operation;
        let dry_run = request.dry_run;
        let retry = &self.config.retry;
        let repository = &self.repository;

        report.result = BatchExecutor::new(batch_config)
            .execute(&items, |item: &SelectedItem| {
                let payload = operation.render(item);
                async move {
                    if dry_run {
                        return serde_json::to_value(&payload)
                            .map_err(|e| RemoteError::Other(e.to_string()));
                    }
                    let label = format!("{} #{}", payload.operation.name(), payload.id);
                    retry
                        .run_remote(&label, || repository.apply(payload.id, &payload.operation))
                        .await
                }
            })
            .await;

        if dry_run {
            report.previews = items
                .iter()
                .take(self.config.max_preview_items)
                .map(|item| operation.render(item))
                .collect();
        }

        if report.result.stopped_early {
            report.warnings.push(BulkWarning::StoppedEarly {
                skipped: report.result.skipped,
            });
        }

        info!(handle = %request.handle, "{}", report.summary());
        Ok(report)
    }

    fn batch_config(&self, request: &BulkRequest) -> Result<BatchConfig, BulkError> {
        let mut config = self.config.batch;
        if let Some(concurrency) = request.concurrency {
            config.concurrency = NonZeroUsize::new(concurrency).ok_or_else(|| {
                BulkError::Validation("concurrency must be at least 1".to_string())
            })?;
        }
        if let Some(stop_on_error) = request.stop_on_error {
            config.stop_on_error = stop_on_error;
        }
        Ok(config)
    }
}

fn unknown_placeholders(operation: &BulkOperation, items: &[SelectedItem]) -> Vec<BulkWarning> {
    let mut warnings = Vec::new();
    for text in operation.templates() {
        for name in template::placeholders(text) {
            let known = KNOWN_FIELDS.contains(&name.as_str())
                || items.iter().any(|item| item.context.extra.contains_key(&name));
            let warning = BulkWarning::UnknownPlaceholder { name };
            if !known && !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use workbulk_core::{ItemContext, QueryKind, SelectionCriteria, WorkItemId};
    use workbulk_storage::{InMemoryHandleStore, StoreQuery};

    #[derive(Default)]
    struct RecordingRepository {
        calls: Mutex<Vec<(WorkItemId, BulkOperation)>>,
        failing: HashMap<WorkItemId, RemoteError>,
        flaky: Mutex<HashMap<WorkItemId, u32>>,
    }

    impl RecordingRepository {
        fn failing_on(id: WorkItemId, err: RemoteError) -> Self {
            Self {
                failing: HashMap::from([(id, err)]),
                ..Default::default()
            }
        }

        fn flaky_on(id: WorkItemId, failures: u32) -> Self {
            Self {
                flaky: Mutex::new(HashMap::from([(id, failures)])),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(WorkItemId, BulkOperation)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkItemRepository for RecordingRepository {
        async fn apply(
            &self,
            id: WorkItemId,
            operation: &BulkOperation,
        ) -> Result<Value, RemoteError> {
            self.calls.lock().unwrap().push((id, operation.clone()));
            if let Some(err) = self.failing.get(&id) {
                return Err(err.clone());
            }
            if let Some(remaining) = self.flaky.lock().unwrap().get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::from_status(503, "service unavailable"));
                }
            }
            Ok(json!({ "id": id.get(), "rev": 2 }))
        }
    }

    type Manager = BulkOperationManager<InMemoryHandleStore, RecordingRepository>;

    fn manager(repository: RecordingRepository) -> (Manager, Arc<RecordingRepository>) {
        let repository = Arc::new(repository);
        let config = BulkConfig::default().with_retry(
            RetryPolicy::new()
                .with_initial_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(50)),
        );
        let manager = BulkOperationManager::new(
            Arc::new(InMemoryHandleStore::new()),
            Arc::clone(&repository),
        )
        .with_config(config);
        (manager, repository)
    }

    async fn seed(manager: &Manager, count: u64, ttl_ms: u64) -> Handle {
        let ids: Vec<WorkItemId> = (1..=count).map(|i| WorkItemId(100 + i)).collect();
        let context = ids
            .iter()
            .enumerate()
            .map(|(position, id)| {
                let state = if position % 2 == 0 { "Active" } else { "New" };
                let ctx = ItemContext::new(format!("Item {}", position), state, "Task")
                    .with_days_inactive(position as u32 * 10);
                (*id, ctx)
            })
            .collect();

        manager
            .store()
            .store_query(
                StoreQuery::new(ids, "SELECT [System.Id] FROM WorkItems", QueryKind::Wiql)
                    .with_ttl_ms(ttl_ms)
                    .with_context(context),
            )
            .await
            .unwrap()
    }

    fn comment(text: &str) -> BulkOperation {
        BulkOperation::Comment {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_partial_failure_then_expiry() {
        let (manager, repository) = manager(RecordingRepository::failing_on(
            WorkItemId(102),
            RemoteError::Validation("field is read-only".to_string()),
        ));
        let handle = seed(&manager, 10, 1000).await;

        let request = BulkRequest::new(
            handle.clone(),
            Selector::Indices {
                indices: vec![0, 1, 2],
            },
            comment("Reviewed {{title}}"),
        )
        .with_concurrency(1);

        let report = manager.run(request.clone()).await.unwrap();
        assert_eq!(report.result.success_count, 2);
        assert_eq!(report.result.failure_count, 1);
        assert_eq!(
            report.result.succeeded_ids(),
            vec![WorkItemId(101), WorkItemId(103)]
        );
        assert_eq!(report.result.failed_ids(), vec![WorkItemId(102)]);
        assert!(report.result.failed[0].1.contains("field is read-only"));
        // Non-retryable: attempted exactly once.
        assert_eq!(repository.calls().len(), 3);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let err = manager.store().get(&handle).await.unwrap_err();
        assert!(matches!(err, StoreError::HandleExpired { .. }));
        let err = manager.run(request).await.unwrap_err();
        assert!(matches!(err, BulkError::HandleExpired { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_repository() {
        let (manager, repository) = manager(RecordingRepository::default());
        let manager = manager.with_config(BulkConfig::default().with_max_preview_items(3));
        let handle = seed(&manager, 10, 60_000).await;

        let report = manager
            .run(
                BulkRequest::new(handle, Selector::All, comment("Closing #{{id}}: {{title}}"))
                    .with_dry_run(true),
            )
            .await
            .unwrap();

        assert!(repository.calls().is_empty());
        assert!(report.dry_run);
        assert_eq!(report.selected_count, 10);
        assert_eq!(report.result.success_count, 10);
        assert_eq!(report.previews.len(), 3);
        assert_eq!(
            report.previews[1].operation,
            comment("Closing #102: Item 1")
        );
        assert_eq!(
            report.result.succeeded[0].1["operation"]["text"],
            "Closing #101: Item 0"
        );
    }

    #[tokio::test]
    async fn test_unknown_handle_fails_request() {
        let (manager, repository) = manager(RecordingRepository::default());
        let err = manager
            .run(BulkRequest::new(
                Handle::from("qh_hallucinated"),
                Selector::All,
                comment("hi"),
            ))
            .await
            .unwrap_err();

        assert_eq!(err, BulkError::HandleNotFound(Handle::from("qh_hallucinated")));
        assert!(repository.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalidated_handle_is_not_found() {
        let (manager, _repository) = manager(RecordingRepository::default());
        let handle = seed(&manager, 2, 60_000).await;
        manager.store().invalidate(&handle).await;

        let err = manager
            .run(BulkRequest::new(handle.clone(), Selector::All, comment("hi")))
            .await
            .unwrap_err();
        assert_eq!(err, BulkError::HandleNotFound(handle));
    }

    #[tokio::test]
    async fn test_empty_selection_is_a_warning() {
        let (manager, repository) = manager(RecordingRepository::default());
        let handle = seed(&manager, 4, 60_000).await;

        let selector = Selector::Criteria(SelectionCriteria {
            states: Some(vec!["Closed".to_string()]),
            ..Default::default()
        });
        let report = manager
            .run(BulkRequest::new(handle, selector, comment("hi")))
            .await
            .unwrap();

        assert_eq!(report.selected_count, 0);
        assert_eq!(report.result.total, 0);
        assert!(matches!(
            report.warnings.as_slice(),
            [BulkWarning::SelectionEmpty { .. }]
        ));
        assert!(repository.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_selection_is_rejected() {
        let (manager, repository) = manager(RecordingRepository::default());
        let manager = manager.with_config(BulkConfig::default().with_max_batch_size(5));
        let handle = seed(&manager, 6, 60_000).await;

        let err = manager
            .run(BulkRequest::new(handle, Selector::All, comment("hi")))
            .await
            .unwrap_err();

        assert!(matches!(err, BulkError::Validation(_)));
        assert!(repository.calls().is_empty());
    }

    #[tokio::test]
    async fn test_request_validation_precedes_handle_lookup() {
        let (manager, _repository) = manager(RecordingRepository::default());

        let err = manager
            .run(BulkRequest::new(Handle::from("qh_missing"), Selector::All, comment(" ")))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Validation(_)));

        let err = manager
            .run(
                BulkRequest::new(Handle::from("qh_missing"), Selector::All, comment("hi"))
                    .with_concurrency(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Validation(_)));

        let err = manager
            .run(BulkRequest::new(
                Handle::from("qh_missing"),
                Selector::Criteria(SelectionCriteria::default()),
                comment("hi"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let (manager, repository) = manager(RecordingRepository::flaky_on(WorkItemId(101), 2));
        let handle = seed(&manager, 2, 3_600_000).await;

        let report = manager
            .run(BulkRequest::new(
                handle,
                Selector::All,
                BulkOperation::Assign {
                    assignee: "ops@example.com".to_string(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(report.result.success_count, 2);
        let attempts_on_first = repository
            .calls()
            .iter()
            .filter(|(id, _)| *id == WorkItemId(101))
            .count();
        assert_eq!(attempts_on_first, 3);
    }

    #[tokio::test]
    async fn test_rendered_payload_reaches_repository() {
        let (manager, repository) = manager(RecordingRepository::default());
        let handle = seed(&manager, 3, 60_000).await;

        manager
            .run(BulkRequest::new(
                handle,
                Selector::Indices { indices: vec![2] },
                BulkOperation::TransitionState {
                    state: "Removed".to_string(),
                    reason: Some("Inactive for {{daysInactive}} days".to_string()),
                },
            ))
            .await
            .unwrap();

        assert_eq!(
            repository.calls(),
            vec![(
                WorkItemId(103),
                BulkOperation::TransitionState {
                    state: "Removed".to_string(),
                    reason: Some("Inactive for 20 days".to_string()),
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_stop_on_error_reports_skipped_items() {
        let (manager, repository) = manager(RecordingRepository::failing_on(
            WorkItemId(101),
            RemoteError::from_status(403, "forbidden"),
        ));
        let handle = seed(&manager, 4, 60_000).await;

        let report = manager
            .run(
                BulkRequest::new(handle, Selector::All, comment("hi"))
                    .with_concurrency(2)
                    .with_stop_on_error(true),
            )
            .await
            .unwrap();

        assert_eq!(report.result.total, 2);
        assert_eq!(report.result.skipped, 2);
        assert_eq!(repository.calls().len(), 2);
        assert!(report
            .warnings
            .contains(&BulkWarning::StoppedEarly { skipped: 2 }));
    }

    #[tokio::test]
    async fn test_unknown_placeholder_is_reported() {
        let (manager, _repository) = manager(RecordingRepository::default());
        let handle = seed(&manager, 1, 60_000).await;

        let report = manager
            .run(
                BulkRequest::new(handle, Selector::All, comment("{{title}} owned by {{owner}}"))
                    .with_dry_run(true),
            )
            .await
            .unwrap();

        assert_eq!(
            report.warnings,
            vec![BulkWarning::UnknownPlaceholder {
                name: "owner".to_string()
            }]
        );
        assert_eq!(report.previews[0].operation, comment("Item 0 owned by "));
    }

    #[tokio::test]
    async fn test_select_without_acting() {
        let (manager, repository) = manager(RecordingRepository::default());
        let handle = seed(&manager, 5, 60_000).await;

        let selector = Selector::Criteria(SelectionCriteria {
            states: Some(vec!["Active".to_string()]),
            days_inactive_min: Some(20),
            ..Default::default()
        });
        let items = manager.select(&handle, &selector).await.unwrap();

        let ids: Vec<WorkItemId> = items.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![WorkItemId(103), WorkItemId(105)]);
        assert!(repository.calls().is_empty());
    }

    #[test]
    fn test_request_from_json() {
        let handle = Handle::new();
        let request = BulkRequest::from_value(&json!({
            "handle": handle.as_str(),
            "selector": [0, 2],
            "operation": { "type": "addTags", "tags": ["triaged"] },
            "dryRun": true,
            "concurrency": 2
        }))
        .unwrap();

        assert_eq!(request.handle, handle);
        assert_eq!(request.selector, Selector::Indices { indices: vec![0, 2] });
        assert!(request.dry_run);
        assert_eq!(request.concurrency, Some(2));
        assert_eq!(request.stop_on_error, None);
    }

    #[test]
    fn test_request_from_json_rejects_bad_shapes() {
        let handle = Handle::new();
        let missing_selector = json!({
            "handle": handle.as_str(),
            "operation": { "type": "comment", "text": "hi" }
        });
        assert!(matches!(
            BulkRequest::from_value(&missing_selector),
            Err(BulkError::Validation(_))
        ));

        let bad_flag = json!({
            "handle": handle.as_str(),
            "selector": "all",
            "operation": { "type": "comment", "text": "hi" },
            "dryRun": "yes"
        });
        assert!(matches!(
            BulkRequest::from_value(&bad_flag),
            Err(BulkError::Validation(_))
        ));

        let bad_operation = json!({
            "handle": handle.as_str(),
            "selector": "all",
            "operation": { "type": "explode" }
        });
        assert!(matches!(
            BulkRequest::from_value(&bad_operation),
            Err(BulkError::Validation(_))
        ));
    }

    #[test]
    fn test_request_from_json_rejects_malformed_handle() {
        for raw in ["qh_hallucinated", "12345", "qh_", "QH_01ARZ3NDEKTSV4RRFFQ69G5FAV"] {
            let err = BulkRequest::from_value(&json!({
                "handle": raw,
                "selector": "all",
                "operation": { "type": "comment", "text": "hi" }
            }))
            .unwrap_err();
            assert!(matches!(err, BulkError::Validation(ref m) if m.contains(raw)), "{}", raw);
        }

        let minted = format!("  {}  ", Handle::new());
        assert!(BulkRequest::from_value(&json!({
            "handle": minted,
            "selector": "all",
            "operation": { "type": "comment", "text": "hi" }
        }))
        .is_ok());
    }
}
