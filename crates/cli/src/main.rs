//! workbulk CLI - safe bulk operations over captured work-item result sets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use workbulk_core::{Handle, ItemContext, QueryKind, WorkItemId};
use workbulk_execution::RemoteError;
use workbulk_storage::{HandleStore, InMemoryHandleStore, StoreQuery};
use workbulk_work::{
    BulkConfig, BulkOperation, BulkOperationManager, BulkRequest, WorkItemRepository,
};

#[derive(Parser)]
#[command(name = "workbulk")]
#[command(about = "Safe bulk operations on work items by handle", long_about = None)]
struct Cli {
    /// JSON file with bulk configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a snapshot and print its handle summary
    Store {
        /// Snapshot file
        snapshot: PathBuf,
        /// Handle lifetime in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Dry-run an operation against a snapshot
    Preview {
        /// Snapshot file
        snapshot: PathBuf,
        /// Selector as JSON: "all", [0, 2] or a criteria object
        #[arg(long, default_value = "\"all\"")]
        selector: String,
        /// Operation as JSON, e.g. {"type":"comment","text":"..."}
        #[arg(long)]
        operation: String,
        /// Items per wave
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// Captured query result, as exported from a tracker.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    query: String,
    #[serde(default = "default_query_kind")]
    query_kind: QueryKind,
    items: Vec<SnapshotItem>,
}

#[derive(Debug, Deserialize)]
struct SnapshotItem {
    id: WorkItemId,
    #[serde(default)]
    context: ItemContext,
}

fn default_query_kind() -> QueryKind {
    QueryKind::Wiql
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse snapshot {}", path.display()))
    }

    fn into_query(self) -> StoreQuery {
        let ids: Vec<WorkItemId> = self.items.iter().map(|item| item.id).collect();
        let context = self
            .items
            .into_iter()
            .map(|item| (item.id, item.context))
            .collect();
        StoreQuery::new(ids, self.query, self.query_kind).with_context(context)
    }
}

/// Repository used when no tracker is configured; every call fails.
struct OfflineRepository;

#[async_trait]
impl WorkItemRepository for OfflineRepository {
    async fn apply(&self, id: WorkItemId, _operation: &BulkOperation) -> Result<Value, RemoteError> {
        Err(RemoteError::Other(format!(
            "no remote repository is configured; cannot update item {}",
            id
        )))
    }
}

fn load_config(path: Option<&Path>) -> Result<BulkConfig> {
    let Some(path) = path else {
        return Ok(BulkConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

async fn store_snapshot(
    store: &InMemoryHandleStore,
    snapshot: &Path,
    ttl_secs: Option<u64>,
) -> Result<Handle> {
    let mut query = Snapshot::load(snapshot)?.into_query();
    if let Some(secs) = ttl_secs {
        query = query.with_ttl(Duration::from_secs(secs));
    }
    Ok(store.store_query(query).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(InMemoryHandleStore::new());

    match cli.command {
        Commands::Store { snapshot, ttl_secs } => {
            let handle = store_snapshot(&store, &snapshot, ttl_secs).await?;
            let set = store.get(&handle).await?;
            let summary = set.summary(chrono::Utc::now());
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Preview {
            snapshot,
            selector,
            operation,
            concurrency,
        } => {
            let handle = store_snapshot(&store, &snapshot, None).await?;
            let request = BulkRequest::from_value(&serde_json::json!({
                "handle": handle.as_str(),
                "selector": serde_json::from_str::<Value>(&selector)
                    .context("selector is not valid JSON")?,
                "operation": serde_json::from_str::<Value>(&operation)
                    .context("operation is not valid JSON")?,
                "dryRun": true,
            }))?;
            let request = match concurrency {
                Some(n) => request.with_concurrency(n),
                None => request,
            };

            let manager = BulkOperationManager::new(Arc::clone(&store), Arc::new(OfflineRepository))
                .with_config(config);
            let report = manager.run(request).await?;
            info!("{}", report.summary());
            for warning in &report.warnings {
                warn!("{}", warning);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
