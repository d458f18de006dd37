use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chronofhir_core::{Resource, VersionId, now_not_before};
use chronofhir_storage::{
    ExpectedVersion, NewVersion, StorageKey, StorageResult, VersionStore, VersionedEntry,
    check_expected, make_storage_key, validate_key,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Version store that keeps every chain in process memory.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    /// `Type/id` -> versions in ascending order
    chains: DashMap<StorageKey, Vec<VersionedEntry>>,
    /// Last assigned write sequence
    sequence: AtomicU64,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chains, including fully deleted ones.
    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    fn type_prefix(resource_type: &str) -> String {
        format!("{resource_type}/")
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn read_current(
        &self,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<VersionedEntry>> {
        let key = make_storage_key(resource_type, id);
        Ok(self
            .chains
            .get(&key)
            .and_then(|chain| chain.last().cloned()))
    }

    async fn read_version(
        &self,
        resource_type: &str,
        id: &str,
        version: VersionId,
    ) -> StorageResult<Option<VersionedEntry>> {
        let key = make_storage_key(resource_type, id);
        Ok(self.chains.get(&key).and_then(|chain| {
            chain
                .iter()
                .find(|e| e.version_id() == version)
                .cloned()
        }))
    }

    async fn write_next(
        &self,
        new: NewVersion,
        expected: ExpectedVersion,
    ) -> StorageResult<VersionedEntry> {
        validate_key(&new.resource_type, &new.id)?;
        let key = make_storage_key(&new.resource_type, &new.id);

        // The entry guard holds the shard lock until the push below. A new
        // chain is inserted only once its precondition holds.
        let mut chain = match self.chains.entry(key) {
            Entry::Occupied(slot) => slot.into_ref(),
            Entry::Vacant(slot) => {
                check_expected(&new.resource_type, &new.id, expected, None)?;
                slot.insert(Vec::new())
            }
        };
        let previous = chain.last().map(|e| &e.resource);
        let current = previous.map(|r| r.version_id);
        check_expected(&new.resource_type, &new.id, expected, current)?;

        let resource = Resource {
            version_id: current.map_or(VersionId::FIRST, VersionId::next),
            last_updated: now_not_before(previous.map(|r| r.last_updated)),
            resource_type: new.resource_type,
            id: new.id,
            deleted: new.deleted,
            content: new.content,
        };
        let entry = VersionedEntry {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            resource,
        };
        chain.push(entry.clone());

        tracing::trace!(
            resource_type = %entry.resource.resource_type,
            id = %entry.resource.id,
            version = %entry.resource.version_id,
            "in-memory version appended"
        );
        Ok(entry)
    }

    async fn scan_current(&self, resource_type: &str) -> StorageResult<Vec<VersionedEntry>> {
        let prefix = Self::type_prefix(resource_type);
        let mut chains: Vec<(u64, VersionedEntry)> = self
            .chains
            .iter()
            .filter(|c| c.key().starts_with(&prefix))
            .filter_map(|c| {
                let first = c.value().first()?.sequence;
                c.value().last().map(|e| (first, e.clone()))
            })
            .collect();
        chains.sort_by_key(|(first, _)| *first);
        Ok(chains.into_iter().map(|(_, e)| e).collect())
    }

    async fn scan_all_versions(
        &self,
        resource_type: &str,
        id: Option<&str>,
    ) -> StorageResult<Vec<VersionedEntry>> {
        let mut entries: Vec<VersionedEntry> = match id {
            Some(id) => {
                let key = make_storage_key(resource_type, id);
                self.chains
                    .get(&key)
                    .map(|chain| chain.value().clone())
                    .unwrap_or_default()
            }
            None => {
                let prefix = Self::type_prefix(resource_type);
                self.chains
                    .iter()
                    .filter(|c| c.key().starts_with(&prefix))
                    .flat_map(|c| c.value().clone())
                    .collect()
            }
        };
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn scan_system_versions(&self) -> StorageResult<Vec<VersionedEntry>> {
        let mut entries: Vec<VersionedEntry> = self
            .chains
            .iter()
            .flat_map(|c| c.value().clone())
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
