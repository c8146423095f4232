//! Captured query result sets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::id::{Handle, WorkItemId};
use crate::Time;

/// Query language that produced a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Work Item Query Language
    Wiql,
    /// OData analytics query
    Odata,
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKind::Wiql => write!(f, "wiql"),
            QueryKind::Odata => write!(f, "odata"),
        }
    }
}

/// Snapshot of one work item, captured when the result set was stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContext {
    /// Item title
    #[serde(default)]
    pub title: String,

    /// Workflow state (e.g. "Active")
    #[serde(default)]
    pub state: String,

    /// Work item type (e.g. "Bug")
    #[serde(default, rename = "type")]
    pub work_item_type: String,

    /// Tags in tracker order
    #[serde(default)]
    pub tags: Vec<String>,

    /// Current assignee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,

    /// Area path
    #[serde(default)]
    pub area_path: String,

    /// Iteration path
    #[serde(default)]
    pub iteration_path: String,

    /// Creation date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<Time>,

    /// Last change date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_date: Option<Time>,

    /// Days since the last substantive change, when computed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_inactive: Option<u32>,

    /// Any other captured fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ItemContext {
    /// Create a context with the three fields every item has.
    pub fn new(
        title: impl Into<String>,
        state: impl Into<String>,
        work_item_type: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            state: state.into(),
            work_item_type: work_item_type.into(),
            ..Default::default()
        }
    }

    /// Set tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set assignee.
    pub fn with_assigned_to(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    /// Set area path.
    pub fn with_area_path(mut self, path: impl Into<String>) -> Self {
        self.area_path = path.into();
        self
    }

    /// Set iteration path.
    pub fn with_iteration_path(mut self, path: impl Into<String>) -> Self {
        self.iteration_path = path.into();
        self
    }

    /// Set days inactive.
    pub fn with_days_inactive(mut self, days: u32) -> Self {
        self.days_inactive = Some(days);
        self
    }

    /// Add an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Look up a field by its template name.
    ///
    /// Returns `None` for names that are unknown or unset on this item.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "title" => Some(self.title.clone()),
            "state" => Some(self.state.clone()),
            "type" | "workItemType" => Some(self.work_item_type.clone()),
            "tags" => Some(self.tags.join("; ")),
            "assignedTo" => self.assigned_to.clone(),
            "areaPath" => Some(self.area_path.clone()),
            "iterationPath" => Some(self.iteration_path.clone()),
            "createdDate" => self.created_date.map(|t| t.to_rfc3339()),
            "changedDate" => self.changed_date.map(|t| t.to_rfc3339()),
            "daysInactive" => self.days_inactive.map(|d| d.to_string()),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// A captured query result, addressed through its handle.
///
/// Immutable once stored; the store hands out shared snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    /// Handle that addresses this set
    pub handle: Handle,

    /// Item ids in query order, without duplicates
    pub ids: Vec<WorkItemId>,

    /// Per-item snapshots; every key is a member of `ids`
    pub item_context: HashMap<WorkItemId, ItemContext>,

    /// Query text that produced the ids
    pub query: String,

    /// Query language
    pub query_kind: QueryKind,

    /// When stored
    pub created_at: Time,

    /// When the handle stops resolving
    pub expires_at: Time,

    /// Opaque analysis output attached by the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
}

impl ResultSet {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set holds no items.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Zero-based position of an id in query order.
    pub fn position_of(&self, id: WorkItemId) -> Option<usize> {
        self.ids.iter().position(|candidate| *candidate == id)
    }

    /// Captured context for an id, if any was stored.
    pub fn context(&self, id: WorkItemId) -> Option<&ItemContext> {
        self.item_context.get(&id)
    }

    /// Whether the set has expired at `now`.
    ///
    /// The expiry instant itself already counts as expired.
    pub fn is_expired_at(&self, now: Time) -> bool {
        now >= self.expires_at
    }

    /// Summarize for listings.
    pub fn summary(&self, now: Time) -> ResultSetSummary {
        ResultSetSummary {
            handle: self.handle.clone(),
            item_count: self.ids.len(),
            query: self.query.clone(),
            query_kind: self.query_kind,
            created_at: self.created_at,
            expires_at: self.expires_at,
            expired: self.is_expired_at(now),
        }
    }
}

/// Listing entry for a stored result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetSummary {
    /// Handle
    pub handle: Handle,
    /// Number of items
    pub item_count: usize,
    /// Query text
    pub query: String,
    /// Query language
    pub query_kind: QueryKind,
    /// When stored
    pub created_at: Time,
    /// When it expires
    pub expires_at: Time,
    /// Whether it had expired when listed
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample_set() -> ResultSet {
        let now = Utc::now();
        let mut item_context = HashMap::new();
        item_context.insert(
            WorkItemId(11),
            ItemContext::new("Fix login", "Active", "Bug").with_tags(["auth", "p1"]),
        );
        ResultSet {
            handle: Handle::new(),
            ids: vec![WorkItemId(11), WorkItemId(12)],
            item_context,
            query: "SELECT [System.Id] FROM WorkItems".to_string(),
            query_kind: QueryKind::Wiql,
            created_at: now,
            expires_at: now + Duration::hours(1),
            analysis: None,
        }
    }

    #[test]
    fn test_field_lookup() {
        let ctx = ItemContext::new("Fix login", "Active", "Bug")
            .with_tags(["auth", "p1"])
            .with_days_inactive(14)
            .with_extra("priority", "2");

        assert_eq!(ctx.field("title").as_deref(), Some("Fix login"));
        assert_eq!(ctx.field("type").as_deref(), Some("Bug"));
        assert_eq!(ctx.field("tags").as_deref(), Some("auth; p1"));
        assert_eq!(ctx.field("daysInactive").as_deref(), Some("14"));
        assert_eq!(ctx.field("priority").as_deref(), Some("2"));
        assert_eq!(ctx.field("assignedTo"), None);
        assert_eq!(ctx.field("nonsense"), None);
    }

    #[test]
    fn test_position_and_context() {
        let set = sample_set();
        assert_eq!(set.len(), 2);
        assert_eq!(set.position_of(WorkItemId(12)), Some(1));
        assert_eq!(set.position_of(WorkItemId(99)), None);
        assert!(set.context(WorkItemId(11)).is_some());
        assert!(set.context(WorkItemId(12)).is_none());
    }

    #[test]
    fn test_expiry_boundary_counts_as_expired() {
        let set = sample_set();
        assert!(!set.is_expired_at(set.expires_at - Duration::milliseconds(1)));
        assert!(set.is_expired_at(set.expires_at));
        assert!(set.summary(set.expires_at).expired);
    }

    #[test]
    fn test_context_deserializes_from_camel_case() {
        let ctx: ItemContext = serde_json::from_value(serde_json::json!({
            "title": "Stale task",
            "state": "New",
            "type": "Task",
            "areaPath": "Proj\\Team",
            "daysInactive": 45
        }))
        .unwrap();
        assert_eq!(ctx.work_item_type, "Task");
        assert_eq!(ctx.area_path, "Proj\\Team");
        assert_eq!(ctx.days_inactive, Some(45));
        assert!(ctx.tags.is_empty());
    }
}
