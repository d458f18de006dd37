//! # chronofhir-storage
//!
//! Version store abstraction for ChronoFHIR.
//!
//! A version store keeps every version ever written for a
//! `(resource type, id)` pair. It is append-only: updates and deletes both
//! add a new version (deletes add a tombstone) and nothing is rewritten in
//! place. Concurrency control is compare-and-swap on the current version,
//! expressed with [`ExpectedVersion`].
//!
//! Implementations live in separate crates (`chronofhir-db-memory`,
//! `chronofhir-db-fs`).

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::VersionStore;
pub use types::{
    ExpectedVersion, NewVersion, StorageKey, VersionedEntry, check_expected, make_storage_key,
    validate_key,
};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared version store trait object.
pub type DynVersionStore = std::sync::Arc<dyn VersionStore>;
