//! In-memory handle store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use workbulk_core::{Handle, ResultSet, ResultSetSummary, Time};

use crate::clock::{Clock, SystemClock};
use crate::trait_::{HandleStore, Result, StoreError, StoreQuery, StoreStats};

/// Handle store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// TTL applied when a request does not set one (milliseconds)
    pub default_ttl_ms: u64,
    /// Interval between background sweeps (milliseconds)
    pub sweep_interval_ms: u64,
    /// How long a retired handle is remembered past its expiry (milliseconds)
    pub retired_retention_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60 * 60 * 1000,
            sweep_interval_ms: 5 * 60 * 1000,
            retired_retention_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl StoreConfig {
    /// Set default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_ms(ttl);
        self
    }

    /// Set sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = duration_ms(interval);
        self
    }

    /// Set retired-handle retention.
    pub fn with_retired_retention(mut self, retention: Duration) -> Self {
        self.retired_retention_ms = duration_ms(retention);
        self
    }

    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Sweep interval as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Retired-handle retention as a duration.
    pub fn retired_retention(&self) -> Duration {
        Duration::from_millis(self.retired_retention_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Why a handle stopped resolving.
#[derive(Debug, Clone, Copy)]
enum Retirement {
    Expired { at: Time },
    Invalidated,
}

#[derive(Debug, Clone, Copy)]
struct Retired {
    reason: Retirement,
    /// The record may be dropped once the clock passes this point.
    forget_after: Time,
}

#[derive(Debug, Default)]
struct StoreState {
    live: HashMap<Handle, Arc<ResultSet>>,
    /// Handles that resolved once and never may again.
    retired: HashMap<Handle, Retired>,
}

impl StoreState {
    fn is_taken(&self, handle: &Handle) -> bool {
        self.live.contains_key(handle) || self.retired.contains_key(handle)
    }

    fn retirement(&self, handle: &Handle) -> Option<Retirement> {
        self.retired.get(handle).map(|retired| retired.reason)
    }

    fn retire(
        &mut self,
        handle: Handle,
        reason: Retirement,
        expires_at: Time,
        retention: chrono::Duration,
    ) {
        let forget_after = expires_at
            .checked_add_signed(retention)
            .unwrap_or(Time::MAX_UTC);
        self.retired.insert(
            handle,
            Retired {
                reason,
                forget_after,
            },
        );
    }

    fn retire_expired(&mut self, handle: &Handle, retention: chrono::Duration) -> Option<Time> {
        let set = self.live.remove(handle)?;
        let at = set.expires_at;
        self.retire(handle.clone(), Retirement::Expired { at }, at, retention);
        Some(at)
    }

    fn invalidate(&mut self, handle: &Handle, retention: chrono::Duration) -> bool {
        match self.live.remove(handle) {
            Some(set) => {
                self.retire(handle.clone(), Retirement::Invalidated, set.expires_at, retention);
                true
            }
            None => false,
        }
    }

    /// Drop retirement records past their horizon. Minted handles carry a
    /// newer ULID timestamp than any record old enough to be dropped.
    fn prune_retired(&mut self, now: Time) -> usize {
        let before = self.retired.len();
        self.retired.retain(|_, retired| retired.forget_after > now);
        before - self.retired.len()
    }
}

/// Process-local handle store.
///
/// One lock serializes inserts and evictions against reads. Entries are
/// immutable after insert and handed out as `Arc` snapshots.
#[derive(Debug)]
pub struct InMemoryHandleStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl InMemoryHandleStore {
    /// Create a store on the wall clock with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Start the background sweeper at the configured interval.
    pub fn start_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        spawn_sweeper(Arc::clone(self), self.config.sweep_interval())
    }

    fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.retired_retention())
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
    }

    fn validate(request: &StoreQuery) -> Result<()> {
        let mut seen = HashSet::with_capacity(request.ids.len());
        if let Some(dup) = request.ids.iter().find(|id| !seen.insert(**id)) {
            return Err(StoreError::Validation(format!(
                "work item {} appears more than once",
                dup
            )));
        }

        if let Some(stray) = request.context.keys().find(|id| !seen.contains(*id)) {
            return Err(StoreError::Validation(format!(
                "context supplied for work item {} which is not in the result set",
                stray
            )));
        }

        Ok(())
    }
}

impl Default for InMemoryHandleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HandleStore for InMemoryHandleStore {
    async fn store_query(&self, request: StoreQuery) -> Result<Handle> {
        Self::validate(&request)?;

        let ttl = request.ttl.unwrap_or_else(|| self.config.default_ttl());
        if ttl.is_zero() {
            return Err(StoreError::Validation("ttl must be greater than zero".to_string()));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| StoreError::Validation(format!("ttl {:?} is out of range", ttl)))?;

        let mut state = self.state.write().await;

        let handle = loop {
            let candidate = Handle::new();
            if !state.is_taken(&candidate) {
                break candidate;
            }
        };

        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or_else(|| StoreError::Validation("ttl is out of range".to_string()))?;

        let set = ResultSet {
            handle: handle.clone(),
            ids: request.ids,
            item_context: request.context,
            query: request.query,
            query_kind: request.query_kind,
            created_at,
            expires_at,
            analysis: request.analysis,
        };

        info!(
            handle = %handle,
            items = set.ids.len(),
            query_kind = %set.query_kind,
            expires_at = %expires_at,
            "Stored result set"
        );

        state.live.insert(handle.clone(), Arc::new(set));
        Ok(handle)
    }

    async fn get(&self, handle: &Handle) -> Result<Arc<ResultSet>> {
        let now = self.clock.now();

        {
            let state = self.state.read().await;
            match state.live.get(handle) {
                Some(set) if !set.is_expired_at(now) => return Ok(Arc::clone(set)),
                Some(_) => {}
                None => {
                    return match state.retirement(handle) {
                        Some(Retirement::Expired { at }) => Err(StoreError::HandleExpired {
                            handle: handle.clone(),
                            expired_at: at,
                        }),
                        Some(Retirement::Invalidated) | None => {
                            Err(StoreError::HandleNotFound(handle.clone()))
                        }
                    };
                }
            }
        }

        // Expired: evict under the write lock. Another caller may have
        // evicted it in between, so fall back to the retirement record.
        let retention = self.retention();
        let mut state = self.state.write().await;
        let expired_at = match state.retire_expired(handle, retention) {
            Some(at) => at,
            None => match state.retirement(handle) {
                Some(Retirement::Expired { at }) => at,
                _ => return Err(StoreError::HandleNotFound(handle.clone())),
            },
        };

        debug!(handle = %handle, expired_at = %expired_at, "Evicted expired result set");
        Err(StoreError::HandleExpired {
            handle: handle.clone(),
            expired_at,
        })
    }

    async fn list(&self, include_expired: bool) -> Vec<ResultSetSummary> {
        let now = self.clock.now();
        let state = self.state.read().await;

        let mut summaries: Vec<_> = state
            .live
            .values()
            .map(|set| set.summary(now))
            .filter(|summary| include_expired || !summary.expired)
            .collect();

        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        summaries
    }

    async fn invalidate(&self, handle: &Handle) -> bool {
        let retention = self.retention();
        let mut state = self.state.write().await;
        if state.invalidate(handle, retention) {
            info!(handle = %handle, "Invalidated result set");
            true
        } else {
            debug!(handle = %handle, "Invalidate on unknown handle ignored");
            false
        }
    }

    async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention();
        let mut state = self.state.write().await;

        let expired: Vec<Handle> = state
            .live
            .iter()
            .filter(|(_, set)| set.is_expired_at(now))
            .map(|(handle, _)| handle.clone())
            .collect();

        for handle in &expired {
            state.retire_expired(handle, retention);
        }
        let forgotten = state.prune_retired(now);

        if !expired.is_empty() || forgotten > 0 {
            debug!(
                removed = expired.len(),
                forgotten,
                remaining = state.live.len(),
                retired = state.retired.len(),
                "Swept expired result sets"
            );
        }
        expired.len()
    }

    async fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let state = self.state.read().await;

        let stats = StoreStats {
            retired: state.retired.len(),
            ..StoreStats::default()
        };
        state
            .live
            .values()
            .fold(stats, |mut stats, set| {
                if set.is_expired_at(now) {
                    stats.expired += 1;
                } else {
                    stats.live += 1;
                    stats.live_items += set.len();
                }
                stats
            })
    }

    async fn clear(&self) {
        let retention = self.retention();
        let mut state = self.state.write().await;
        let handles: Vec<Handle> = state.live.keys().cloned().collect();
        for handle in &handles {
            state.invalidate(handle, retention);
        }
        info!("Cleared handle store");
    }
}

/// Periodically sweep expired entries until the returned task is aborted.
pub fn spawn_sweeper<S>(store: Arc<S>, interval: Duration) -> JoinHandle<()>
where
    S: HandleStore + ?Sized + 'static,
{
    // A zero period would panic in `interval`.
    let interval = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.sweep_expired().await;
            if removed > 0 {
                debug!(removed, "Background sweep finished");
            }
        }
    })
}
