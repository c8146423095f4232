//! `{{name}}` placeholder substitution against item snapshots.

use regex::{Captures, Regex};
use std::sync::OnceLock;
use workbulk_core::{ItemContext, WorkItemId};

/// Placeholder names every item can resolve.
///
/// Any other name is looked up in the item's extra fields and renders as
/// an empty string when absent.
pub const KNOWN_FIELDS: [&str; 12] = [
    "id",
    "title",
    "state",
    "type",
    "workItemType",
    "assignedTo",
    "areaPath",
    "iterationPath",
    "tags",
    "createdDate",
    "changedDate",
    "daysInactive",
];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Substitute every placeholder in `template` from an item.
///
/// Unknown or unset fields render as the empty string.
pub fn render(template: &str, id: WorkItemId, context: &ItemContext) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "id" => id.to_string(),
            name => context.field(name).unwrap_or_default(),
        })
        .into_owned()
}

/// Distinct placeholder names in `template`, in first-seen order.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_pattern().captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    }
    names
}
