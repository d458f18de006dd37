use chronofhir_api::ApiError;
use chronofhir_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Invalid value for search parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SearchError {
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidParameter { .. } => ApiError::bad_request(err.to_string()),
            SearchError::Storage(storage) => storage.into(),
        }
    }
}
