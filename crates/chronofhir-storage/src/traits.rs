//! The version store contract.

use async_trait::async_trait;
use chronofhir_core::VersionId;

use crate::StorageResult;
use crate::types::{ExpectedVersion, NewVersion, VersionedEntry};

/// Durable, append-only mapping from `(type, id, version)` to content.
///
/// Implementations must be thread-safe (`Send + Sync`). The only mutating
/// call is [`VersionStore::write_next`], which must check the expected
/// current version and append the next one atomically with respect to
/// other writers of the same `(type, id)`. Readers never wait on writers
/// and never observe a partially written version.
///
/// # Example
///
/// ```ignore
/// use chronofhir_storage::{ExpectedVersion, NewVersion, StorageResult, VersionStore};
///
/// async fn touch(store: &dyn VersionStore) -> StorageResult<()> {
///     let current = store.read_current("Patient", "p1").await?;
///     let expected = ExpectedVersion::from_current(current.map(|e| e.version_id()));
///     store
///         .write_next(NewVersion::content("Patient", "p1", serde_json::json!({})), expected)
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Latest entry of the chain, tombstone or not.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing chains.
    async fn read_current(
        &self,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<VersionedEntry>>;

    /// One historical version.
    async fn read_version(
        &self,
        resource_type: &str,
        id: &str,
        version: VersionId,
    ) -> StorageResult<Option<VersionedEntry>>;

    /// Appends the next version of a chain.
    ///
    /// The new version number is the current one plus one (1 for a new
    /// chain) and `lastUpdated` is never earlier than the previous entry's.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionConflict` if the chain's current
    /// version does not satisfy `expected`.
    /// Returns `StorageError::InvalidKey` if the type or id is unusable.
    async fn write_next(
        &self,
        new: NewVersion,
        expected: ExpectedVersion,
    ) -> StorageResult<VersionedEntry>;

    /// Current entry of every chain of a type, tombstones included, in
    /// chain creation order.
    async fn scan_current(&self, resource_type: &str) -> StorageResult<Vec<VersionedEntry>>;

    /// Every stored version of a type, or of one chain, in write order.
    async fn scan_all_versions(
        &self,
        resource_type: &str,
        id: Option<&str>,
    ) -> StorageResult<Vec<VersionedEntry>>;

    /// Every stored version across all types, in write order.
    async fn scan_system_versions(&self) -> StorageResult<Vec<VersionedEntry>>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
