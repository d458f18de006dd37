//! Storage error types for the version store abstraction.

use std::fmt;

/// Errors that can occur during version store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The chain moved on since the caller read it.
    #[error("Version conflict on {resource_type}/{id}: expected {expected}, found {actual}")]
    VersionConflict {
        resource_type: String,
        id: String,
        /// What the writer expected the current version to be.
        expected: String,
        /// The current version actually found.
        actual: String,
    },

    /// The (type, id) pair cannot be used as a store key.
    #[error("Invalid storage key: {message}")]
    InvalidKey { message: String },

    /// A stored version could not be decoded or does not match its key.
    #[error("Corrupted version {location}: {message}")]
    Corrupted { location: String, message: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StorageError {
    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VersionConflict {
            resource_type: resource_type.into(),
            id: id.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `Corrupted` error.
    #[must_use]
    pub fn corrupted(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidKey { .. } => ErrorCategory::Validation,
            Self::Corrupted { .. } | Self::Serialization(_) => ErrorCategory::Corruption,
            Self::Io(_) => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Optimistic write lost a race.
    Conflict,
    /// Caller supplied an unusable key.
    Validation,
    /// Stored data is unreadable.
    Corruption,
    /// Filesystem or other backing infrastructure failed.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Corruption => write!(f, "corruption"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
