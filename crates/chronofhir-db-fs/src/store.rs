use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chronofhir_core::{FhirDateTime, Resource, VersionId, now_not_before};
use chronofhir_storage::{
    ExpectedVersion, NewVersion, StorageError, StorageKey, StorageResult, VersionStore,
    VersionedEntry,
    check_expected, make_storage_key, validate_key,
};
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;

use crate::naming::VersionFileName;

/// Tracked head of one chain.
#[derive(Debug, Clone, Copy)]
struct ChainPointer {
    current: VersionId,
    last_updated: FhirDateTime,
    /// Sequence of the chain's first version, for creation-order scans.
    first_sequence: u64,
}

/// Version store writing one JSON file per version.
#[derive(Debug)]
pub struct DirectoryVersionStore {
    root: PathBuf,
    index: DashMap<StorageKey, ChainPointer>,
    write_locks: DashMap<StorageKey, Arc<Mutex<()>>>,
    sequence: AtomicU64,
}

impl DirectoryVersionStore {
    /// Opens (creating if needed) a store rooted at `root` and rebuilds the
    /// current-version index from the files found there.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let store = Self {
            root,
            index: DashMap::new(),
            write_locks: DashMap::new(),
            sequence: AtomicU64::new(0),
        };

        let mut max_sequence = 0;
        let mut files = 0usize;
        for name in store.list_version_files().await? {
            let entry = store.read_file(&name).await?.ok_or_else(|| {
                StorageError::corrupted(name.to_string(), "file vanished while opening")
            })?;
            max_sequence = max_sequence.max(entry.sequence);
            files += 1;

            let key = make_storage_key(&name.resource_type, &name.id);
            store
                .index
                .entry(key)
                .and_modify(|p| {
                    if entry.version_id() > p.current {
                        p.current = entry.version_id();
                        p.last_updated = entry.resource.last_updated;
                    }
                    p.first_sequence = p.first_sequence.min(entry.sequence);
                })
                .or_insert(ChainPointer {
                    current: entry.version_id(),
                    last_updated: entry.resource.last_updated,
                    first_sequence: entry.sequence,
                });
        }
        store.sequence.store(max_sequence, Ordering::SeqCst);

        tracing::info!(
            root = %store.root.display(),
            chains = store.index.len(),
            versions = files,
            "directory version store opened"
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn list_version_files(&self) -> StorageResult<Vec<VersionFileName>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }
            match VersionFileName::parse(&file_name) {
                Some(name) => names.push(name),
                None => tracing::debug!(file = %file_name, "ignoring non-version file"),
            }
        }
        Ok(names)
    }

    async fn read_file(&self, name: &VersionFileName) -> StorageResult<Option<VersionedEntry>> {
        let path = self.root.join(name.to_string());
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: VersionedEntry = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::corrupted(name.to_string(), e.to_string()))?;

        let r = &entry.resource;
        if r.resource_type != name.resource_type || r.id != name.id || r.version_id != name.version {
            return Err(StorageError::corrupted(
                name.to_string(),
                format!("file holds {}", r.versioned_reference()),
            ));
        }
        Ok(Some(entry))
    }

    async fn write_file(&self, name: &VersionFileName, entry: &VersionedEntry) -> StorageResult<()> {
        let target = self.root.join(name.to_string());
        let temp = self.root.join(name.temp_name());
        let bytes = serde_json::to_vec_pretty(entry)?;

        fs::write(&temp, bytes).await?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn pointer(&self, key: &str) -> Option<ChainPointer> {
        self.index.get(key).map(|p| *p.value())
    }

    async fn read_scanned(
        &self,
        names: Vec<VersionFileName>,
    ) -> StorageResult<Vec<VersionedEntry>> {
        let mut entries = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(entry) = self.read_file(name).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

#[async_trait]
impl VersionStore for DirectoryVersionStore {
    async fn read_current(
        &self,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<Option<VersionedEntry>> {
        let key = make_storage_key(resource_type, id);
        let Some(pointer) = self.pointer(&key) else {
            return Ok(None);
        };
        let name = VersionFileName::new(resource_type, id, pointer.current);
        match self.read_file(&name).await? {
            Some(entry) => Ok(Some(entry)),
            None => Err(StorageError::corrupted(
                name.to_string(),
                "current version file is missing",
            )),
        }
    }

    async fn read_version(
        &self,
        resource_type: &str,
        id: &str,
        version: VersionId,
    ) -> StorageResult<Option<VersionedEntry>> {
        if validate_key(resource_type, id).is_err() {
            return Ok(None);
        }
        self.read_file(&VersionFileName::new(resource_type, id, version))
            .await
    }

    async fn write_next(
        &self,
        new: NewVersion,
        expected: ExpectedVersion,
    ) -> StorageResult<VersionedEntry> {
        validate_key(&new.resource_type, &new.id)?;
        let key = make_storage_key(&new.resource_type, &new.id);

        let lock = Arc::clone(self.write_locks.entry(key.clone()).or_default().value());
        let _guard = lock.lock().await;

        let pointer = self.pointer(&key);
        check_expected(
            &new.resource_type,
            &new.id,
            expected,
            pointer.map(|p| p.current),
        )?;

        let version = pointer.map_or(VersionId::FIRST, |p| p.current.next());
        let last_updated = now_not_before(pointer.map(|p| p.last_updated));
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = VersionedEntry {
            sequence,
            resource: Resource {
                resource_type: new.resource_type,
                id: new.id,
                version_id: version,
                last_updated,
                deleted: new.deleted,
                content: new.content,
            },
        };

        let name = VersionFileName::new(&entry.resource.resource_type, &entry.resource.id, version);
        self.write_file(&name, &entry).await?;
        self.index.insert(
            key,
            ChainPointer {
                current: version,
                last_updated,
                first_sequence: pointer.map_or(sequence, |p| p.first_sequence),
            },
        );

        tracing::debug!(file = %name, sequence, "version file written");
        Ok(entry)
    }

    async fn scan_current(&self, resource_type: &str) -> StorageResult<Vec<VersionedEntry>> {
        let prefix = format!("{resource_type}/");
        let mut heads: Vec<(String, ChainPointer)> = self
            .index
            .iter()
            .filter_map(|p| {
                p.key()
                    .strip_prefix(&prefix)
                    .map(|id| (id.to_string(), *p.value()))
            })
            .collect();
        heads.sort_by_key(|(_, p)| p.first_sequence);

        let mut entries = Vec::with_capacity(heads.len());
        for (id, pointer) in heads {
            let name = VersionFileName::new(resource_type, id, pointer.current);
            match self.read_file(&name).await? {
                Some(entry) => entries.push(entry),
                None => {
                    return Err(StorageError::corrupted(
                        name.to_string(),
                        "current version file is missing",
                    ));
                }
            }
        }
        Ok(entries)
    }

    async fn scan_all_versions(
        &self,
        resource_type: &str,
        id: Option<&str>,
    ) -> StorageResult<Vec<VersionedEntry>> {
        let names = self
            .list_version_files()
            .await?
            .into_iter()
            .filter(|n| n.resource_type == resource_type && id.is_none_or(|id| n.id == id))
            .collect();
        self.read_scanned(names).await
    }

    async fn scan_system_versions(&self) -> StorageResult<Vec<VersionedEntry>> {
        let names = self.list_version_files().await?;
        self.read_scanned(names).await
    }

    fn backend_name(&self) -> &'static str {
        "directory"
    }
}
