use chronofhir_storage::{DynVersionStore, VersionedEntry};
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::error::SearchError;
use crate::params::SearchParameters;

/// Matches of one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Current, non-deleted versions in scan order, truncated to the limit.
    pub matches: Vec<VersionedEntry>,
    /// Match count before truncation.
    pub total: usize,
    /// Parameters that did not take part in matching.
    pub unsupported: Vec<(String, String)>,
}

/// Brute-force evaluator over a version store. Stateless apart from the
/// shared store handle, so one instance serves concurrent searches.
#[derive(Clone)]
pub struct SearchEngine {
    store: DynVersionStore,
}

impl SearchEngine {
    pub fn new(store: DynVersionStore) -> Self {
        Self { store }
    }

    pub async fn search(
        &self,
        resource_type: &str,
        params: &SearchParameters,
        limit: Option<usize>,
    ) -> Result<SearchOutcome, SearchError> {
        let scanned = if params.has_filters() {
            let mut found = Vec::new();
            for id in params.candidate_ids() {
                if let Some(entry) = self.store.read_current(resource_type, &id).await? {
                    found.push(entry);
                }
            }
            found
        } else {
            self.store.scan_current(resource_type).await?
        };

        let mut by_id: IndexMap<String, VersionedEntry> = IndexMap::new();
        for entry in scanned {
            match by_id.entry(entry.resource.id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(mut slot) => {
                    if entry.version_id() > slot.get().version_id() {
                        slot.insert(entry);
                    }
                }
            }
        }

        // Tombstones go only after dedup so a deleted head hides older content
        let mut matches: Vec<VersionedEntry> = by_id
            .into_values()
            .filter(|e| !e.is_tombstone())
            .collect();
        let total = matches.len();
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        if !params.unsupported.is_empty() {
            tracing::debug!(
                resource_type,
                unsupported = ?params.unsupported,
                "search parameters ignored"
            );
        }

        Ok(SearchOutcome {
            matches,
            total,
            unsupported: params.unsupported.clone(),
        })
    }
}
