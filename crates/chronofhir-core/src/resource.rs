use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::datetime::FhirDateTime;
use crate::error::{CoreError, Result};
use crate::summary::SummaryMode;

/// Server-assigned version number within one version chain.
///
/// Versions start at 1 and grow by exactly one per accepted write,
/// tombstones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(u64);

impl VersionId {
    pub const FIRST: VersionId = VersionId(1);

    pub fn new(value: u64) -> Result<Self> {
        if value == 0 {
            return Err(CoreError::invalid_version("0"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Weak ETag form, `W/"<n>"`.
    pub fn etag(self) -> String {
        format!("W/\"{}\"", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::invalid_version(s))?;
        Self::new(value)
    }
}

/// One stored version of a resource.
///
/// `content` is the client payload with server-managed metadata removed;
/// [`Resource::to_json`] stamps `id`, `resourceType` and `meta` back on.
/// Tombstones carry `Value::Null` content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_type: String,
    pub id: String,
    pub version_id: VersionId,
    pub last_updated: FhirDateTime,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub content: Value,
}

impl Resource {
    /// `Type/id`
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// `Type/id/_history/version`
    pub fn versioned_reference(&self) -> String {
        format!(
            "{}/{}/_history/{}",
            self.resource_type, self.id, self.version_id
        )
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Applies `_summary` subsetting to the stored content.
    pub fn summarized(mut self, mode: SummaryMode) -> Self {
        if !self.deleted {
            mode.apply(&mut self.content);
        }
        self
    }

    /// Renders the resource as the client sees it.
    pub fn to_json(&self) -> Value {
        let mut obj = match &self.content {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        obj.insert("resourceType".into(), json!(self.resource_type));
        obj.insert("id".into(), json!(self.id));

        let meta = obj.entry("meta").or_insert_with(|| json!({}));
        if !meta.is_object() {
            *meta = json!({});
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert("versionId".into(), json!(self.version_id.to_string()));
            meta.insert("lastUpdated".into(), json!(self.last_updated.to_string()));
        }
        Value::Object(obj)
    }
}

/// Reads the `id` element of a payload, if it is a non-empty string.
pub fn content_id(content: &Value) -> Option<&str> {
    content
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

pub fn content_resource_type(content: &Value) -> Option<&str> {
    content.get("resourceType").and_then(Value::as_str)
}

/// Removes `meta.versionId` and `meta.lastUpdated`; both are server-owned.
pub fn strip_server_meta(content: &mut Value) {
    let Some(obj) = content.as_object_mut() else {
        return;
    };
    let empty = match obj.get_mut("meta").and_then(Value::as_object_mut) {
        Some(meta) => {
            meta.remove("versionId");
            meta.remove("lastUpdated");
            meta.is_empty()
        }
        None => false,
    };
    if empty {
        obj.remove("meta");
    }
}
