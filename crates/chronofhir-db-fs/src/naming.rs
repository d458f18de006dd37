use std::fmt;

use chronofhir_core::VersionId;
use chronofhir_storage::validate_key;

/// Name of one version file: `{type}.{id}.{version}.json`.
///
/// Resource types never contain dots, so the type is everything before the
/// first dot and the version everything between the last dot and `.json`;
/// ids may contain dots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFileName {
    pub resource_type: String,
    pub id: String,
    pub version: VersionId,
}

impl VersionFileName {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, version: VersionId) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version,
        }
    }

    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let (rest, version) = stem.rsplit_once('.')?;
        let (resource_type, id) = rest.split_once('.')?;
        let version = version.parse().ok()?;
        validate_key(resource_type, id).ok()?;
        Some(Self::new(resource_type, id, version))
    }

    /// Scratch name used while the file is being written.
    pub fn temp_name(&self) -> String {
        format!(".{self}.tmp")
    }
}

impl fmt::Display for VersionFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.json", self.resource_type, self.id, self.version)
    }
}
