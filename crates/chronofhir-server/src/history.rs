//! Chronological views over the append-only store.

use chronofhir_api::{ApiError, ApiResult, Bundle, BundleEntry, join_url};
use chronofhir_core::FhirDateTime;
use chronofhir_storage::{DynVersionStore, StorageResult, VersionedEntry};

use crate::repository::BundleOptions;

/// `_since` (inclusive) and `_till` (exclusive) bounds on `lastUpdated`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub since: Option<FhirDateTime>,
    pub till: Option<FhirDateTime>,
}

impl HistoryRange {
    pub fn from_params(params: &[(String, String)]) -> ApiResult<Self> {
        let mut range = Self::default();
        for (name, value) in params {
            let slot = match name.as_str() {
                "_since" => &mut range.since,
                "_till" => &mut range.till,
                _ => continue,
            };
            *slot = Some(
                FhirDateTime::parse_bound(value)
                    .map_err(|e| ApiError::bad_request(format!("{name}: {e}")))?,
            );
        }
        Ok(range)
    }

    pub fn contains(&self, instant: FhirDateTime) -> bool {
        self.since.is_none_or(|since| instant >= since)
            && self.till.is_none_or(|till| instant < till)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope<'a> {
    System,
    Type(&'a str),
    Instance(&'a str, &'a str),
}

impl HistoryScope<'_> {
    fn self_path(&self) -> String {
        match self {
            Self::System => "_history".to_string(),
            Self::Type(rt) => format!("{rt}/_history"),
            Self::Instance(rt, id) => format!("{rt}/{id}/_history"),
        }
    }
}

/// Versions selected by one history call.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    /// In write order, truncated to the limit.
    pub entries: Vec<VersionedEntry>,
    /// Count after range filtering, before truncation.
    pub total: usize,
}

#[derive(Clone)]
pub struct HistoryLog {
    store: DynVersionStore,
}

impl HistoryLog {
    pub fn new(store: DynVersionStore) -> Self {
        Self { store }
    }

    pub async fn collect(
        &self,
        scope: HistoryScope<'_>,
        range: &HistoryRange,
        limit: Option<usize>,
    ) -> StorageResult<HistoryPage> {
        let mut entries = match scope {
            HistoryScope::System => self.store.scan_system_versions().await?,
            HistoryScope::Type(rt) => self.store.scan_all_versions(rt, None).await?,
            HistoryScope::Instance(rt, id) => self.store.scan_all_versions(rt, Some(id)).await?,
        };
        entries.retain(|e| range.contains(e.resource.last_updated));
        entries.sort_by_key(|e| e.sequence);

        let total = entries.len();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(HistoryPage { entries, total })
    }

    /// Runs a history query from request parameters and renders the bundle.
    pub async fn bundle(
        &self,
        scope: HistoryScope<'_>,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle> {
        let range = HistoryRange::from_params(params)?;
        let (count, summary) = opts.result_params(params)?;
        let page = self.collect(scope, &range, Some(opts.limit(count))).await?;

        let entries = if summary.omits_entries() {
            Vec::new()
        } else {
            page.entries
                .into_iter()
                .map(|e| BundleEntry::history(&opts.base_uri, &e.resource.summarized(summary)))
                .collect()
        };

        tracing::debug!(
            scope = ?scope,
            total = page.total,
            returned = entries.len(),
            "history assembled"
        );

        Ok(Bundle::history(page.total as u64, entries)
            .with_self_link(join_url(&opts.base_uri, &scope.self_path()))
            .annotated(opts.base_uri.clone(), summary))
    }
}
