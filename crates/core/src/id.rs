//! Identifiers for handles and work items.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque reference to one stored result set.
///
/// Handles are handed to external callers as plain strings. Anything a
/// caller sends back is accepted as a `Handle`; whether it resolves is
/// the store's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Prefix carried by every minted handle.
    pub const PREFIX: &'static str = "qh_";

    /// Mint a fresh handle.
    pub fn new() -> Self {
        Self(format!("{}{}", Self::PREFIX, Ulid::new()))
    }

    /// Borrow the wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the value has the shape of a minted handle.
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(Self::PREFIX)
            .map(|rest| rest.parse::<Ulid>().is_ok())
            .unwrap_or(false)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::str::FromStr for Handle {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// Identifier of a work item in the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItemId(pub u64);

impl WorkItemId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for WorkItemId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
