use std::fmt;

use chronofhir_core::{CoreError, ErrorCategory as CoreCategory};
use chronofhir_storage::{ErrorCategory as StorageCategory, StorageError};
use thiserror::Error;

use crate::outcome::{IssueSeverity, IssueType, OperationOutcome};

/// Protocol-level failures. The transport maps [`ApiError::status`] to its
/// own status codes; the body is always [`ApiError::to_operation_outcome`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Gone: {0}")]
    Gone(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Error kind without the message, for the transport and for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Gone,
    Conflict,
    PreconditionFailed,
    NotImplemented,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
            Self::Gone => "gone",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
            Self::NotImplemented => "not_implemented",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// HTTP-equivalent status category of a protocol result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCategory {
    Ok,
    Created,
    NoContent,
    BadRequest,
    NotFound,
    Gone,
    Conflict,
    PreconditionFailed,
    InternalError,
    NotImplemented,
}

impl StatusCategory {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Gone => 410,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::InternalError => 500,
            Self::NotImplemented => 501,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Created => "Created",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::Gone => "Gone",
            Self::Conflict => "Conflict",
            Self::PreconditionFailed => "Precondition Failed",
            Self::InternalError => "Internal Server Error",
            Self::NotImplemented => "Not Implemented",
        }
    }

    pub fn is_success(&self) -> bool {
        self.code() < 300
    }
}

/// `201 Created`, the form used in `Bundle.entry.response.status`.
impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn gone(msg: impl Into<String>) -> Self {
        Self::Gone(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Gone(_) => ErrorKind::Gone,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCategory {
        match self {
            Self::BadRequest(_) => StatusCategory::BadRequest,
            Self::NotFound(_) => StatusCategory::NotFound,
            Self::Gone(_) => StatusCategory::Gone,
            Self::Conflict(_) => StatusCategory::Conflict,
            Self::PreconditionFailed(_) => StatusCategory::PreconditionFailed,
            Self::NotImplemented(_) => StatusCategory::NotImplemented,
            Self::Internal(_) => StatusCategory::InternalError,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Gone(m)
            | Self::Conflict(m)
            | Self::PreconditionFailed(m)
            | Self::NotImplemented(m)
            | Self::Internal(m) => m,
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        use IssueSeverity::{Error, Fatal};
        match self {
            Self::BadRequest(msg) => OperationOutcome::single(Error, IssueType::Invalid, msg),
            Self::NotFound(msg) => OperationOutcome::single(Error, IssueType::NotFound, msg),
            Self::Gone(msg) => OperationOutcome::single(Error, IssueType::Deleted, msg),
            Self::Conflict(msg) => OperationOutcome::single(Error, IssueType::Conflict, msg),
            Self::PreconditionFailed(msg) => {
                OperationOutcome::single(Error, IssueType::Conflict, msg)
            }
            Self::NotImplemented(msg) => {
                OperationOutcome::single(Error, IssueType::NotSupported, msg)
            }
            Self::Internal(msg) => OperationOutcome::single(Fatal, IssueType::Exception, msg),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err.category() {
            StorageCategory::Conflict => Self::Conflict(err.to_string()),
            StorageCategory::Validation => Self::BadRequest(err.to_string()),
            StorageCategory::Corruption
            | StorageCategory::Infrastructure
            | StorageCategory::Internal => Self::Internal(err.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err.category() {
            CoreCategory::Validation => Self::BadRequest(err.to_string()),
            CoreCategory::Configuration => Self::Internal(err.to_string()),
        }
    }
}
