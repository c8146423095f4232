//! Bulk operation specs and their per-item rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use workbulk_core::WorkItemId;
use workbulk_execution::SelectedItem;

use crate::template;

/// A mutation to apply to every selected item.
///
/// Every string value is a template rendered against each item's
/// snapshot before the call is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BulkOperation {
    /// Add a discussion comment
    #[serde(rename_all = "camelCase")]
    Comment {
        /// Comment body
        text: String,
    },
    /// Set field values by reference name
    #[serde(rename_all = "camelCase")]
    UpdateFields {
        /// Field reference name to value
        fields: BTreeMap<String, String>,
    },
    /// Change assignee
    #[serde(rename_all = "camelCase")]
    Assign {
        /// New assignee
        assignee: String,
    },
    /// Move to another workflow state
    #[serde(rename_all = "camelCase")]
    TransitionState {
        /// Target state
        state: String,
        /// Reason recorded with the transition
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Add tags
    #[serde(rename_all = "camelCase")]
    AddTags {
        /// Tags to add
        tags: Vec<String>,
    },
    /// Remove tags
    #[serde(rename_all = "camelCase")]
    RemoveTags {
        /// Tags to remove
        tags: Vec<String>,
    },
    /// Move to another iteration
    #[serde(rename_all = "camelCase")]
    MoveIteration {
        /// Target iteration path
        iteration_path: String,
    },
}

impl BulkOperation {
    /// Stable operation name, used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Comment { .. } => "comment",
            BulkOperation::UpdateFields { .. } => "updateFields",
            BulkOperation::Assign { .. } => "assign",
            BulkOperation::TransitionState { .. } => "transitionState",
            BulkOperation::AddTags { .. } => "addTags",
            BulkOperation::RemoveTags { .. } => "removeTags",
            BulkOperation::MoveIteration { .. } => "moveIteration",
        }
    }

    /// Reject operations that could never be applied.
    pub fn validate(&self) -> Result<(), String> {
        fn required(value: &str, what: &str) -> Result<(), String> {
            if value.trim().is_empty() {
                Err(format!("{} must not be empty", what))
            } else {
                Ok(())
            }
        }

        fn non_empty_tags(tags: &[String]) -> Result<(), String> {
            if tags.is_empty() {
                return Err("at least one tag is required".to_string());
            }
            tags.iter().try_for_each(|tag| required(tag, "tag"))
        }

        match self {
            BulkOperation::Comment { text } => required(text, "comment text"),
            BulkOperation::UpdateFields { fields } => {
                if fields.is_empty() {
                    return Err("at least one field is required".to_string());
                }
                fields.keys().try_for_each(|name| required(name, "field name"))
            }
            BulkOperation::Assign { assignee } => required(assignee, "assignee"),
            BulkOperation::TransitionState { state, .. } => required(state, "target state"),
            BulkOperation::AddTags { tags } | BulkOperation::RemoveTags { tags } => {
                non_empty_tags(tags)
            }
            BulkOperation::MoveIteration { iteration_path } => {
                required(iteration_path, "iteration path")
            }
        }
    }

    /// Every template string in the operation.
    pub fn templates(&self) -> Vec<&str> {
        match self {
            BulkOperation::Comment { text } => vec![text.as_str()],
            BulkOperation::UpdateFields { fields } => fields.values().map(String::as_str).collect(),
            BulkOperation::Assign { assignee } => vec![assignee.as_str()],
            BulkOperation::TransitionState { state, reason } => {
                let mut out = vec![state.as_str()];
                out.extend(reason.as_deref());
                out
            }
            BulkOperation::AddTags { tags } | BulkOperation::RemoveTags { tags } => {
                tags.iter().map(String::as_str).collect()
            }
            BulkOperation::MoveIteration { iteration_path } => vec![iteration_path.as_str()],
        }
    }

    /// Render the operation for one item.
    pub fn render(&self, item: &SelectedItem) -> OperationPayload {
        let fill = |text: &str| template::render(text, item.id, &item.context);

        let operation = match self {
            BulkOperation::Comment { text } => BulkOperation::Comment { text: fill(text) },
            BulkOperation::UpdateFields { fields } => BulkOperation::UpdateFields {
                fields: fields
                    .iter()
                    .map(|(name, value)| (name.clone(), fill(value)))
                    .collect(),
            },
            BulkOperation::Assign { assignee } => BulkOperation::Assign {
                assignee: fill(assignee),
            },
            BulkOperation::TransitionState { state, reason } => BulkOperation::TransitionState {
                state: fill(state),
                reason: reason.as_deref().map(fill),
            },
            BulkOperation::AddTags { tags } => BulkOperation::AddTags {
                tags: tags.iter().map(|tag| fill(tag)).collect(),
            },
            BulkOperation::RemoveTags { tags } => BulkOperation::RemoveTags {
                tags: tags.iter().map(|tag| fill(tag)).collect(),
            },
            BulkOperation::MoveIteration { iteration_path } => BulkOperation::MoveIteration {
                iteration_path: fill(iteration_path),
            },
        };

        OperationPayload {
            id: item.id,
            title: item.context.title.clone(),
            operation,
        }
    }
}

/// An operation rendered for a specific item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPayload {
    /// Target item
    pub id: WorkItemId,
    /// Title at capture time, for previews
    pub title: String,
    /// Rendered operation
    pub operation: BulkOperation,
}
