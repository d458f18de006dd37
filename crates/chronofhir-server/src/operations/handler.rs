//! Operation handler trait and error types.

use async_trait::async_trait;
use chronofhir_api::ApiError;
use chronofhir_core::SummaryMode;
use chronofhir_storage::{StorageError, VersionStore};
use serde_json::Value;
use std::sync::Arc;

/// Error type for named operation failures.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Invalid or missing parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation not supported at this level
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What a handler gets to work with.
pub struct OperationContext<'a> {
    pub resource_type: &'a str,
    pub store: &'a dyn VersionStore,
    pub summary: SummaryMode,
}

/// Context of a system-level invocation; no resource type is addressed.
pub struct SystemOperationContext<'a> {
    pub store: &'a dyn VersionStore,
    pub summary: SummaryMode,
}

/// A named, non-CRUD action on the system, a type or an instance.
///
/// Default implementations return `NotSupported`, so a handler overrides
/// only the levels it serves. `code` is the name without the `$` prefix.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn code(&self) -> &str;

    /// Canonical reference advertised in the capability statement.
    fn definition(&self) -> String {
        format!("urn:chronofhir:operation:{}", self.code())
    }

    /// Handles `$code` addressed at the server base.
    async fn handle_system(
        &self,
        _ctx: &SystemOperationContext<'_>,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at system level",
            self.code()
        )))
    }

    /// Handles `Type/$code`.
    async fn handle_type(
        &self,
        _ctx: &OperationContext<'_>,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at type level",
            self.code()
        )))
    }

    /// Handles `Type/id/$code`.
    async fn handle_instance(
        &self,
        _ctx: &OperationContext<'_>,
        _id: &str,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at instance level",
            self.code()
        )))
    }
}

pub type DynOperationHandler = Arc<dyn OperationHandler>;

impl From<OperationError> for ApiError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::InvalidParameters(msg) => ApiError::bad_request(msg),
            OperationError::NotFound(msg) => ApiError::not_found(msg),
            OperationError::NotSupported(msg) => ApiError::not_implemented(msg),
            OperationError::Internal(msg) => ApiError::internal(msg),
            OperationError::Storage(e) => e.into(),
        }
    }
}
