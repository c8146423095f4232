//! Resolving selectors against stored result sets.

use std::collections::HashSet;

use workbulk_core::{ItemContext, ResultSet, SelectionCriteria, Selector, WorkItemId};

/// One resolved item, ready to be handed to an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedItem {
    /// Item id
    pub id: WorkItemId,
    /// Zero-based position in the result set
    pub position: usize,
    /// Captured snapshot; empty when none was stored
    pub context: ItemContext,
}

/// Turns a selector into a concrete, ordered list of items.
///
/// Resolution is pure: the same set and selector always give the same
/// items in the same order. An empty selection is a valid outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionEngine;

impl SelectionEngine {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Resolve `selector` against `set`.
    pub fn resolve(&self, set: &ResultSet, selector: &Selector) -> Vec<SelectedItem> {
        match selector {
            Selector::All => set
                .ids
                .iter()
                .enumerate()
                .map(|(position, id)| Self::item(set, position, *id))
                .collect(),

            Selector::Indices { indices } => {
                let mut seen = HashSet::with_capacity(indices.len());
                indices
                    .iter()
                    .copied()
                    .filter(|position| *position < set.ids.len() && seen.insert(*position))
                    .map(|position| Self::item(set, position, set.ids[position]))
                    .collect()
            }

            Selector::Criteria(criteria) => set
                .ids
                .iter()
                .enumerate()
                .map(|(position, id)| Self::item(set, position, *id))
                .filter(|item| Self::matches(criteria, &item.context))
                .collect(),
        }
    }

    /// Short human-readable summary of a selector.
    pub fn describe(&self, selector: &Selector) -> String {
        match selector {
            Selector::All => "all items".to_string(),
            Selector::Indices { indices } => {
                let listed: Vec<String> = indices.iter().map(ToString::to_string).collect();
                format!("items at positions [{}]", listed.join(", "))
            }
            Selector::Criteria(criteria) => {
                let mut parts = Vec::new();
                if let Some(states) = &criteria.states {
                    parts.push(format!("state in [{}]", states.join(", ")));
                }
                if let Some(keywords) = &criteria.title_contains {
                    parts.push(format!("title contains any of [{}]", keywords.join(", ")));
                }
                if let Some(tags) = &criteria.tags {
                    parts.push(format!("tagged any of [{}]", tags.join(", ")));
                }
                match (criteria.days_inactive_min, criteria.days_inactive_max) {
                    (Some(min), Some(max)) => parts.push(format!("inactive {}-{} days", min, max)),
                    (Some(min), None) => parts.push(format!("inactive at least {} days", min)),
                    (None, Some(max)) => parts.push(format!("inactive at most {} days", max)),
                    (None, None) => {}
                }
                if parts.is_empty() {
                    "items matching no filters".to_string()
                } else {
                    format!("items where {}", parts.join(" and "))
                }
            }
        }
    }

    fn item(set: &ResultSet, position: usize, id: WorkItemId) -> SelectedItem {
        SelectedItem {
            id,
            position,
            context: set.context(id).cloned().unwrap_or_default(),
        }
    }

    fn matches(criteria: &SelectionCriteria, context: &ItemContext) -> bool {
        if let Some(states) = &criteria.states {
            if !states.iter().any(|state| *state == context.state) {
                return false;
            }
        }

        if let Some(keywords) = &criteria.title_contains {
            let title = context.title.to_lowercase();
            if !keywords
                .iter()
                .any(|keyword| title.contains(&keyword.to_lowercase()))
            {
                return false;
            }
        }

        if let Some(tags) = &criteria.tags {
            if !context.tags.iter().any(|tag| tags.contains(tag)) {
                return false;
            }
        }

        if let Some(min) = criteria.days_inactive_min {
            match context.days_inactive {
                Some(days) if days >= min => {}
                _ => return false,
            }
        }

        if let Some(max) = criteria.days_inactive_max {
            match context.days_inactive {
                Some(days) if days <= max => {}
                _ => return false,
            }
        }

        true
    }
}
