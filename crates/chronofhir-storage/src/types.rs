//! Value types exchanged with version stores.

use std::fmt;

use chronofhir_core::{Resource, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Store key, formatted as `ResourceType/id`.
pub type StorageKey = String;

pub fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// Rejects keys that could escape the `(type, id)` namespace.
///
/// Path separators and relative path components are refused so a file
/// backed store can use the pair in file names verbatim.
pub fn validate_key(resource_type: &str, id: &str) -> Result<(), StorageError> {
    if resource_type.is_empty() || id.is_empty() {
        return Err(StorageError::invalid_key("resource type and id are required"));
    }
    if !resource_type.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StorageError::invalid_key(format!(
            "resource type '{resource_type}' must be alphanumeric"
        )));
    }
    if id.contains(['/', '\\']) || id.starts_with('.') || id.contains("..") {
        return Err(StorageError::invalid_key(format!(
            "id '{id}' contains path components"
        )));
    }
    Ok(())
}

/// A stored version plus its position in the global write order.
///
/// `sequence` is assigned by the store, strictly increasing across all
/// writes of that store; history views sort by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedEntry {
    pub sequence: u64,
    pub resource: Resource,
}

impl VersionedEntry {
    pub fn version_id(&self) -> VersionId {
        self.resource.version_id
    }

    pub fn is_tombstone(&self) -> bool {
        self.resource.deleted
    }
}

/// Payload of a write; the store assigns version and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub resource_type: String,
    pub id: String,
    pub content: Value,
    pub deleted: bool,
}

impl NewVersion {
    pub fn content(resource_type: impl Into<String>, id: impl Into<String>, content: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            content,
            deleted: false,
        }
    }

    pub fn tombstone(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            content: Value::Null,
            deleted: true,
        }
    }
}

/// Compare-and-swap token for [`crate::VersionStore::write_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No precondition.
    Any,
    /// The chain must not exist yet.
    NoChain,
    /// The current version must be exactly this one.
    Exactly(VersionId),
}

impl ExpectedVersion {
    pub fn from_current(current: Option<VersionId>) -> Self {
        match current {
            Some(v) => Self::Exactly(v),
            None => Self::NoChain,
        }
    }

    pub fn matches(&self, current: Option<VersionId>) -> bool {
        match self {
            Self::Any => true,
            Self::NoChain => current.is_none(),
            Self::Exactly(expected) => current == Some(*expected),
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::NoChain => write!(f, "none"),
            Self::Exactly(v) => write!(f, "{v}"),
        }
    }
}

/// Checks the CAS token and builds the conflict error when it fails.
pub fn check_expected(
    resource_type: &str,
    id: &str,
    expected: ExpectedVersion,
    current: Option<VersionId>,
) -> Result<(), StorageError> {
    if expected.matches(current) {
        return Ok(());
    }
    let actual = current.map_or_else(|| "none".to_string(), |v| v.to_string());
    Err(StorageError::version_conflict(
        resource_type,
        id,
        expected.to_string(),
        actual,
    ))
}
