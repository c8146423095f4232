//! Selection input: which items of a result set to act on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which subset of a result set an operation targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Selector {
    /// Every item, in stored order
    All,
    /// Zero-based positions into the stored order
    Indices {
        /// Positions, in requested order
        indices: Vec<usize>,
    },
    /// Items matching every supplied filter
    Criteria(SelectionCriteria),
}

/// Filters for [`Selector::Criteria`]. Unset filters do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionCriteria {
    /// Item state must be one of these
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<String>>,

    /// Title must contain at least one keyword (case-insensitive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<Vec<String>>,

    /// Item must carry at least one of these tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    /// Lower bound on days inactive (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_inactive_min: Option<u32>,

    /// Upper bound on days inactive (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_inactive_max: Option<u32>,
}

impl SelectionCriteria {
    /// Keys accepted in the untagged object form.
    pub const KEYS: [&'static str; 5] = [
        "states",
        "titleContains",
        "tags",
        "daysInactiveMin",
        "daysInactiveMax",
    ];

    /// Whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.states.is_none()
            && self.title_contains.is_none()
            && self.tags.is_none()
            && self.days_inactive_min.is_none()
            && self.days_inactive_max.is_none()
    }
}

/// A selector that cannot be accepted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectorError {
    /// No selector supplied
    #[error("selector is required (use \"all\", a list of indices, or a criteria object)")]
    Missing,

    /// Unrecognized string selector
    #[error("unknown selector keyword '{0}'")]
    UnknownKeyword(String),

    /// Index that is not a non-negative integer
    #[error("invalid index {0}: indices must be non-negative integers")]
    InvalidIndex(String),

    /// Unrecognized criteria key
    #[error("unknown criteria field '{0}'")]
    UnknownField(String),

    /// Object mixes indices with other keys
    #[error("'indices' cannot be combined with other selector fields")]
    MixedShape,

    /// Criteria without any filter
    #[error("criteria selector must set at least one filter")]
    EmptyCriteria,

    /// Lower bound above upper bound
    #[error("daysInactiveMin ({min}) is greater than daysInactiveMax ({max})")]
    InvertedRange {
        /// Lower bound
        min: u32,
        /// Upper bound
        max: u32,
    },

    /// Structurally invalid input
    #[error("malformed selector: {0}")]
    Malformed(String),
}

impl Selector {
    /// Build a selector from loosely shaped JSON input.
    ///
    /// Accepted shapes: `"all"`, `[0, 2]`, `{"indices": [0, 2]}`, a
    /// criteria object, or the tagged form produced by serialization.
    pub fn from_value(value: &Value) -> Result<Self, SelectorError> {
        let selector = match value {
            Value::Null => return Err(SelectorError::Missing),
            Value::String(keyword) => {
                if keyword.eq_ignore_ascii_case("all") || keyword == "*" {
                    Selector::All
                } else {
                    return Err(SelectorError::UnknownKeyword(keyword.clone()));
                }
            }
            Value::Array(items) => Selector::Indices {
                indices: parse_indices(items)?,
            },
            Value::Object(map) => {
                if map.contains_key("kind") {
                    serde_json::from_value(value.clone())
                        .map_err(|e| SelectorError::Malformed(e.to_string()))?
                } else if let Some(indices) = map.get("indices") {
                    if map.len() != 1 {
                        return Err(SelectorError::MixedShape);
                    }
                    let items = indices.as_array().ok_or_else(|| {
                        SelectorError::Malformed("'indices' must be an array".to_string())
                    })?;
                    Selector::Indices {
                        indices: parse_indices(items)?,
                    }
                } else {
                    if let Some(key) = map
                        .keys()
                        .find(|key| !SelectionCriteria::KEYS.contains(&key.as_str()))
                    {
                        return Err(SelectorError::UnknownField(key.clone()));
                    }
                    let criteria: SelectionCriteria = serde_json::from_value(value.clone())
                        .map_err(|e| SelectorError::Malformed(e.to_string()))?;
                    Selector::Criteria(criteria)
                }
            }
            other => {
                return Err(SelectorError::Malformed(format!(
                    "unsupported selector value {}",
                    other
                )))
            }
        };

        selector.validate()?;
        Ok(selector)
    }

    /// Check the selector's shape.
    pub fn validate(&self) -> Result<(), SelectorError> {
        match self {
            Selector::All | Selector::Indices { .. } => Ok(()),
            Selector::Criteria(criteria) => {
                if criteria.is_empty() {
                    return Err(SelectorError::EmptyCriteria);
                }
                if let (Some(min), Some(max)) =
                    (criteria.days_inactive_min, criteria.days_inactive_max)
                {
                    if min > max {
                        return Err(SelectorError::InvertedRange { min, max });
                    }
                }
                Ok(())
            }
        }
    }
}

fn parse_indices(items: &[Value]) -> Result<Vec<usize>, SelectorError> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| SelectorError::InvalidIndex(item.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyword_all() {
        assert_eq!(Selector::from_value(&json!("all")).unwrap(), Selector::All);
        assert_eq!(Selector::from_value(&json!("ALL")).unwrap(), Selector::All);
        assert_eq!(
            Selector::from_value(&json!("some")),
            Err(SelectorError::UnknownKeyword("some".to_string()))
        );
    }

    #[test]
    fn test_index_forms() {
        let expected = Selector::Indices {
            indices: vec![0, 0, 2],
        };
        assert_eq!(Selector::from_value(&json!([0, 0, 2])).unwrap(), expected);
        assert_eq!(
            Selector::from_value(&json!({ "indices": [0, 0, 2] })).unwrap(),
            expected
        );
    }

    #[test]
    fn test_negative_index_rejected() {
        let err = Selector::from_value(&json!([1, -1])).unwrap_err();
        assert_eq!(err, SelectorError::InvalidIndex("-1".to_string()));

        let err = Selector::from_value(&json!([1.5])).unwrap_err();
        assert!(matches!(err, SelectorError::InvalidIndex(_)));
    }

    #[test]
    fn test_indices_mixed_with_criteria_rejected() {
        let err = Selector::from_value(&json!({ "indices": [0], "states": ["New"] })).unwrap_err();
        assert_eq!(err, SelectorError::MixedShape);
    }

    #[test]
    fn test_criteria_object() {
        let selector = Selector::from_value(&json!({
            "states": ["Active"],
            "titleContains": ["login"],
            "daysInactiveMin": 30
        }))
        .unwrap();

        match selector {
            Selector::Criteria(criteria) => {
                assert_eq!(criteria.states, Some(vec!["Active".to_string()]));
                assert_eq!(criteria.title_contains, Some(vec!["login".to_string()]));
                assert_eq!(criteria.days_inactive_min, Some(30));
                assert_eq!(criteria.tags, None);
            }
            other => panic!("expected criteria, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_criteria_field_rejected() {
        let err = Selector::from_value(&json!({ "status": ["Active"] })).unwrap_err();
        assert_eq!(err, SelectorError::UnknownField("status".to_string()));
    }

    #[test]
    fn test_empty_and_inverted_criteria_rejected() {
        assert_eq!(
            Selector::from_value(&json!({})),
            Err(SelectorError::EmptyCriteria)
        );
        assert_eq!(
            Selector::from_value(&json!({ "daysInactiveMin": 10, "daysInactiveMax": 5 })),
            Err(SelectorError::InvertedRange { min: 10, max: 5 })
        );
    }

    #[test]
    fn test_tagged_form_roundtrips() {
        let selector = Selector::Criteria(SelectionCriteria {
            tags: Some(vec!["stale".to_string()]),
            ..Default::default()
        });
        let value = serde_json::to_value(&selector).unwrap();
        assert_eq!(value["kind"], "criteria");
        assert_eq!(Selector::from_value(&value).unwrap(), selector);
    }

    #[test]
    fn test_null_is_missing() {
        assert_eq!(Selector::from_value(&Value::Null), Err(SelectorError::Missing));
    }
}
