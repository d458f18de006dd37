//! Logical id generation and syntax checks.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::error::CoreError;

/// Maximum length of a logical id.
pub const MAX_ID_LENGTH: usize = 64;

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-\.]+$").expect("id pattern is valid"));

static RESOURCE_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Za-z]*$").expect("resource type pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id must not be empty")]
    Empty,
    #[error("id is {0} characters long, the limit is {MAX_ID_LENGTH}")]
    TooLong(usize),
    #[error("id '{0}' contains characters outside [A-Za-z0-9-.]")]
    InvalidCharacters(String),
}

impl From<IdError> for CoreError {
    fn from(err: IdError) -> Self {
        CoreError::invalid_id(err.to_string())
    }
}

/// Generates a fresh server-assigned logical id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(IdError::TooLong(id.len()));
    }
    if !ID_PATTERN.is_match(id) {
        return Err(IdError::InvalidCharacters(id.to_string()));
    }
    Ok(())
}

/// Checks that a resource type name is a plain capitalized identifier.
pub fn validate_resource_type(resource_type: &str) -> crate::Result<()> {
    if RESOURCE_TYPE_PATTERN.is_match(resource_type) {
        Ok(())
    } else {
        Err(CoreError::invalid_resource_type(resource_type))
    }
}
