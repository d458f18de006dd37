use thiserror::Error;

/// Core error types for ChronoFHIR operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid FHIR resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid FHIR ID: {0}")]
    InvalidId(String),

    #[error("Invalid version id: {0}")]
    InvalidVersion(String),

    #[error("Invalid FHIR DateTime: {0}")]
    InvalidDateTime(String),

    #[error("Invalid summary mode: {0}")]
    InvalidSummaryMode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidVersion error
    pub fn invalid_version(version: impl Into<String>) -> Self {
        Self::InvalidVersion(version.into())
    }

    /// Create a new InvalidDateTime error
    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidResourceType(_)
                | Self::InvalidId(_)
                | Self::InvalidVersion(_)
                | Self::InvalidDateTime(_)
                | Self::InvalidSummaryMode(_)
        )
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidResourceType(_)
            | Self::InvalidId(_)
            | Self::InvalidVersion(_)
            | Self::InvalidDateTime(_)
            | Self::InvalidSummaryMode(_) => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_resource_type("Unknown/Type");
        assert_eq!(err.to_string(), "Invalid FHIR resource type: Unknown/Type");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_invalid_version_error() {
        let err = CoreError::invalid_version("abc");
        assert_eq!(err.to_string(), "Invalid version id: abc");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_configuration_error() {
        let err = CoreError::configuration("Invalid config value");
        assert_eq!(err.to_string(), "Configuration error: Invalid config value");
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.category().to_string(), "configuration");
    }
}
