use chronofhir_core::validate_resource_type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fhir: FhirSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        url::Url::parse(&self.server.base_url)
            .map_err(|e| format!("server.base_url must be an absolute URL: {e}"))?;
        // Storage validations
        if self.storage.backend == StorageBackend::Directory
            && self
                .storage
                .directory
                .as_deref()
                .unwrap_or("")
                .trim()
                .is_empty()
        {
            return Err("storage.backend=directory requires storage.directory".into());
        }
        // Resource type validations
        if self.fhir.resource_types.is_empty() {
            return Err("fhir.resource_types must list at least one type".into());
        }
        for (i, rt) in self.fhir.resource_types.iter().enumerate() {
            validate_resource_type(rt)
                .map_err(|e| format!("fhir.resource_types[{i}]: {e}"))?;
            if self.fhir.resource_types[..i].contains(rt) {
                return Err(format!("fhir.resource_types lists '{rt}' twice"));
            }
        }
        // Search validations
        if self.search.default_count == 0 {
            return Err("search.default_count must be > 0".into());
        }
        if self.search.max_count == 0 {
            return Err("search.max_count must be > 0".into());
        }
        if self.search.default_count > self.search.max_count {
            return Err("search.default_count must be <= search.max_count".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Base address without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.server.base_url.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Externally visible base address, used in `fullUrl`s and locations.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}
fn default_base_url() -> String {
    "http://localhost:8080/fhir".into()
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Directory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the `directory` backend.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirSettings {
    /// Types the server registers a repository for.
    #[serde(default = "default_resource_types")]
    pub resource_types: Vec<String>,
}
fn default_resource_types() -> Vec<String> {
    [
        "Patient",
        "Practitioner",
        "Organization",
        "Encounter",
        "Observation",
        "Condition",
        "Procedure",
        "MedicationRequest",
        "AllergyIntolerance",
        "DiagnosticReport",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            resource_types: default_resource_types(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_default")]
    pub default_count: usize,
    #[serde(default = "default_search_max")]
    pub max_count: usize,
}
fn default_search_default() -> usize {
    50
}
fn default_search_max() -> usize {
    500
}
impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_count: default_search_default(),
            max_count: default_search_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "chronofhir.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "config file not found; using defaults");
        }
        // Environment variable overrides, e.g., CHRONOFHIR__SEARCH__MAX_COUNT=100
        builder = builder.add_source(
            Environment::with_prefix("CHRONOFHIR")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fhir.resource_types"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.base_url(), "http://localhost:8080/fhir");
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert!(cfg.fhir.resource_types.iter().any(|t| t == "Patient"));
    }

    #[test]
    fn directory_backend_needs_a_path() {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Directory;
        assert!(cfg.validate().unwrap_err().contains("storage.directory"));
        cfg.storage.directory = Some("/tmp/chronofhir".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn resource_types_are_checked() {
        let mut cfg = AppConfig::default();
        cfg.fhir.resource_types = vec!["patient".into()];
        assert!(cfg.validate().is_err());
        cfg.fhir.resource_types = vec!["Patient".into(), "Patient".into()];
        assert!(cfg.validate().unwrap_err().contains("twice"));
        cfg.fhir.resource_types.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn base_url_must_be_absolute() {
        let mut cfg = AppConfig::default();
        cfg.server.base_url = "fhir".into();
        assert!(cfg.validate().is_err());
        cfg.server.base_url = "https://example.org/fhir/".into();
        assert_eq!(cfg.base_url(), "https://example.org/fhir");
    }
}
