//! Per-type resource repositories.
//!
//! A [`ResourceRepository`] owns the lifecycle rules of one resource type:
//! id assignment, conditional create and update, tombstoning deletes and
//! the read-side views. [`StoreBackedRepository`] is the implementation the
//! server registers for every configured type.

use std::sync::Arc;

use async_trait::async_trait;
use chronofhir_api::{ApiError, ApiResult, Bundle, BundleEntry, OperationOutcome, join_url};
use chronofhir_core::{
    Resource, SummaryMode, VersionId, content_id, content_resource_type, generate_id,
    strip_server_meta, validate_id,
};
use chronofhir_search::{SearchEngine, SearchParameters};
use chronofhir_storage::{DynVersionStore, ExpectedVersion, NewVersion, VersionedEntry};
use serde_json::Value;

use crate::history::{HistoryLog, HistoryScope};
use crate::operations::{OperationContext, OperationRegistry};

/// Preconditions of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Conditional update filter: 0 matches creates, 1 updates that
    /// resource, more fails.
    pub if_match: Option<Vec<(String, String)>>,
    /// Conditional create filter: 0 matches creates, 1 returns the match
    /// unchanged, more fails.
    pub if_none_exist: Option<Vec<(String, String)>>,
    /// POST semantics: the body must not carry an id and a fresh one is
    /// always assigned.
    pub create_only: bool,
}

impl WriteOptions {
    pub fn create_only() -> Self {
        Self {
            create_only: true,
            ..Default::default()
        }
    }
}

/// Result of a write, tagged explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub resource: Resource,
    /// True when no chain existed for the id before this call.
    pub created: bool,
    /// False when a conditional create returned its match unchanged.
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// Tombstones written, one per deleted resource.
    Deleted { tombstones: Vec<Resource> },
    /// Nothing to delete.
    NoOp,
}

/// Rendering options shared by search and history bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOptions {
    pub base_uri: String,
    /// Page size when the request gives no `_count`.
    pub page_size: usize,
    pub max_page_size: usize,
    pub summary: SummaryMode,
}

impl BundleOptions {
    pub fn new(base_uri: impl Into<String>, page_size: usize, max_page_size: usize) -> Self {
        Self {
            base_uri: base_uri.into(),
            page_size: page_size.min(max_page_size),
            max_page_size,
            summary: SummaryMode::False,
        }
    }

    pub fn with_summary(mut self, summary: SummaryMode) -> Self {
        self.summary = summary;
        self
    }

    /// Effective page size for a requested `_count`.
    pub fn limit(&self, count: Option<usize>) -> usize {
        count.unwrap_or(self.page_size).min(self.max_page_size)
    }

    /// Reads `_count` and `_summary`, falling back to the request summary.
    pub fn result_params(
        &self,
        params: &[(String, String)],
    ) -> ApiResult<(Option<usize>, SummaryMode)> {
        let mut count = None;
        let mut summary = self.summary;
        for (name, value) in params {
            match name.as_str() {
                "_count" => {
                    count = Some(value.trim().parse::<usize>().map_err(|_| {
                        ApiError::bad_request(format!("_count: '{value}' is not a count"))
                    })?)
                }
                "_summary" => summary = value.parse()?,
                _ => {}
            }
        }
        Ok((count, summary))
    }
}

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    fn resource_type(&self) -> &str;

    /// Creates or updates a resource.
    ///
    /// An id is taken from the body (or from the conditional match) and
    /// assigned when absent. A conditional update that matches nothing
    /// always gets a fresh id. The write is a compare-and-swap against the
    /// current version read at the start of the call; losing a race
    /// surfaces as `Conflict`.
    async fn create(&self, content: Value, options: WriteOptions) -> ApiResult<WriteOutcome>;

    /// Current version, or an explicit historical one.
    async fn get(
        &self,
        id: &str,
        version: Option<&str>,
        summary: SummaryMode,
    ) -> ApiResult<Resource>;

    /// Tombstones `id`, or every resource matching `filter` when no id is
    /// given.
    async fn delete(
        &self,
        id: Option<&str>,
        filter: Option<&[(String, String)]>,
    ) -> ApiResult<DeleteOutcome>;

    async fn search(&self, params: &[(String, String)], opts: &BundleOptions) -> ApiResult<Bundle>;

    async fn type_history(
        &self,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle>;

    async fn instance_history(
        &self,
        id: &str,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle>;

    async fn perform_operation(
        &self,
        name: &str,
        params: &Value,
        summary: SummaryMode,
        id: Option<&str>,
    ) -> ApiResult<Value>;
}

/// Repository over a shared [`chronofhir_storage::VersionStore`].
///
/// Holds no mutable state; every instance for every type shares the same
/// store, search engine and operation registry.
pub struct StoreBackedRepository {
    resource_type: String,
    store: DynVersionStore,
    engine: SearchEngine,
    history: HistoryLog,
    operations: Arc<OperationRegistry>,
}

impl StoreBackedRepository {
    pub fn new(
        resource_type: impl Into<String>,
        store: DynVersionStore,
        operations: Arc<OperationRegistry>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            engine: SearchEngine::new(store.clone()),
            history: HistoryLog::new(store.clone()),
            store,
            operations,
        }
    }

    /// Current, non-deleted resources selected by a conditional filter.
    async fn resolve_filter(
        &self,
        filter: &[(String, String)],
        purpose: &str,
    ) -> ApiResult<Vec<VersionedEntry>> {
        if filter.is_empty() {
            return Err(ApiError::bad_request(format!(
                "{purpose} requires search parameters"
            )));
        }
        let params = SearchParameters::parse(filter)?;
        if !params.has_filters() {
            return Err(ApiError::bad_request(format!(
                "{purpose} requires a supported search parameter (_id)"
            )));
        }
        if !params.unsupported.is_empty() {
            tracing::warn!(
                resource_type = %self.resource_type,
                purpose,
                unsupported = ?params.unsupported,
                "conditional parameters ignored"
            );
        }
        Ok(self
            .engine
            .search(&self.resource_type, &params, None)
            .await?
            .matches)
    }

    fn not_found(&self, id: &str) -> ApiError {
        ApiError::not_found(format!("{}/{id} not found", self.resource_type))
    }

    fn gone(&self, id: &str) -> ApiError {
        ApiError::gone(format!("{}/{id} has been deleted", self.resource_type))
    }

    /// Appends a tombstone unless the chain is absent or already deleted.
    async fn tombstone(&self, id: &str) -> ApiResult<Option<Resource>> {
        let Some(current) = self.store.read_current(&self.resource_type, id).await? else {
            return Ok(None);
        };
        if current.is_tombstone() {
            return Ok(None);
        }
        let entry = self
            .store
            .write_next(
                NewVersion::tombstone(&self.resource_type, id),
                ExpectedVersion::Exactly(current.version_id()),
            )
            .await?;
        tracing::debug!(
            resource_type = %self.resource_type,
            id,
            version = %entry.version_id(),
            "resource deleted"
        );
        Ok(Some(entry.resource))
    }
}

#[async_trait]
impl ResourceRepository for StoreBackedRepository {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    async fn create(&self, mut content: Value, options: WriteOptions) -> ApiResult<WriteOutcome> {
        if !content.is_object() {
            return Err(ApiError::bad_request("resource body must be a JSON object"));
        }
        match content_resource_type(&content) {
            Some(rt) if rt != self.resource_type => {
                return Err(ApiError::bad_request(format!(
                    "resourceType '{rt}' does not match '{}'",
                    self.resource_type
                )));
            }
            _ => {}
        }
        strip_server_meta(&mut content);
        let body_id = content_id(&content).map(str::to_string);
        if let Some(obj) = content.as_object_mut() {
            obj.remove("id");
            obj.remove("resourceType");
        }

        if options.create_only && body_id.is_some() {
            return Err(ApiError::bad_request("id must be empty for create"));
        }

        if let Some(filter) = &options.if_none_exist {
            let mut matches = self.resolve_filter(filter, "conditional create").await?;
            match matches.len() {
                0 => {}
                1 => {
                    let existing = matches.remove(0).resource;
                    tracing::debug!(
                        resource_type = %self.resource_type,
                        id = %existing.id,
                        "conditional create matched an existing resource"
                    );
                    return Ok(WriteOutcome {
                        resource: existing,
                        created: false,
                        written: false,
                    });
                }
                n => {
                    return Err(ApiError::precondition_failed(format!(
                        "conditional create matched {n} resources"
                    )));
                }
            }
        }

        let id = if options.create_only {
            generate_id()
        } else if let Some(filter) = &options.if_match {
            let matches = self.resolve_filter(filter, "conditional update").await?;
            match matches.as_slice() {
                // No match creates a fresh chain; the body id may name a
                // resource outside the filter.
                [] => generate_id(),
                [only] => match body_id.as_deref() {
                    Some(body_id) if body_id != only.resource.id => {
                        return Err(ApiError::bad_request(format!(
                            "resource id '{body_id}' does not match the conditional target '{}'",
                            only.resource.id
                        )));
                    }
                    _ => only.resource.id.clone(),
                },
                many => {
                    return Err(ApiError::precondition_failed(format!(
                        "conditional update matched {} resources",
                        many.len()
                    )));
                }
            }
        } else {
            body_id.unwrap_or_else(generate_id)
        };

        validate_id(&id).map_err(|e| ApiError::bad_request(format!("invalid id '{id}': {e}")))?;

        let current = self.store.read_current(&self.resource_type, &id).await?;
        let expected = ExpectedVersion::from_current(current.as_ref().map(|e| e.version_id()));
        let entry = self
            .store
            .write_next(NewVersion::content(&self.resource_type, &id, content), expected)
            .await?;

        tracing::debug!(
            resource_type = %self.resource_type,
            id = %id,
            version = %entry.version_id(),
            "resource written"
        );

        Ok(WriteOutcome {
            resource: entry.resource,
            created: current.is_none() || options.create_only,
            written: true,
        })
    }

    async fn get(
        &self,
        id: &str,
        version: Option<&str>,
        summary: SummaryMode,
    ) -> ApiResult<Resource> {
        let entry = match version {
            Some(raw) => {
                let version: VersionId = raw.parse()?;
                match self
                    .store
                    .read_version(&self.resource_type, id, version)
                    .await?
                {
                    Some(entry) => entry,
                    None => {
                        if self
                            .store
                            .read_current(&self.resource_type, id)
                            .await?
                            .is_none()
                        {
                            return Err(self.not_found(id));
                        }
                        return Err(ApiError::not_found(format!(
                            "{}/{id} has no version {version}",
                            self.resource_type
                        )));
                    }
                }
            }
            None => self
                .store
                .read_current(&self.resource_type, id)
                .await?
                .ok_or_else(|| self.not_found(id))?,
        };

        if entry.is_tombstone() {
            return Err(self.gone(id));
        }
        Ok(entry.resource.summarized(summary))
    }

    async fn delete(
        &self,
        id: Option<&str>,
        filter: Option<&[(String, String)]>,
    ) -> ApiResult<DeleteOutcome> {
        let targets: Vec<String> = match id {
            Some(id) => vec![id.to_string()],
            None => self
                .resolve_filter(filter.unwrap_or_default(), "conditional delete")
                .await?
                .into_iter()
                .map(|e| e.resource.id)
                .collect(),
        };

        let mut tombstones = Vec::new();
        for id in &targets {
            if let Some(tombstone) = self.tombstone(id).await? {
                tombstones.push(tombstone);
            }
        }

        if tombstones.is_empty() {
            Ok(DeleteOutcome::NoOp)
        } else {
            Ok(DeleteOutcome::Deleted { tombstones })
        }
    }

    async fn search(&self, params: &[(String, String)], opts: &BundleOptions) -> ApiResult<Bundle> {
        let parsed = SearchParameters::parse(params)?;
        let summary = parsed.summary.unwrap_or(opts.summary);
        let limit = opts.limit(parsed.count);

        let outcome = self
            .engine
            .search(&self.resource_type, &parsed, Some(limit))
            .await?;

        let entries = if summary.omits_entries() {
            Vec::new()
        } else {
            outcome
                .matches
                .into_iter()
                .map(|e| BundleEntry::search_match(&opts.base_uri, &e.resource.summarized(summary)))
                .collect()
        };
        let warning = (!outcome.unsupported.is_empty())
            .then(|| OperationOutcome::unsupported_params_warning(&outcome.unsupported));

        Ok(
            Bundle::searchset(outcome.total as u64, entries, warning)
                .with_self_link(join_url(&opts.base_uri, &self.resource_type))
                .annotated(opts.base_uri.clone(), summary),
        )
    }

    async fn type_history(
        &self,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle> {
        self.history
            .bundle(HistoryScope::Type(&self.resource_type), params, opts)
            .await
    }

    async fn instance_history(
        &self,
        id: &str,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle> {
        let bundle = self
            .history
            .bundle(HistoryScope::Instance(&self.resource_type, id), params, opts)
            .await?;
        if bundle.total == Some(0)
            && self
                .store
                .read_current(&self.resource_type, id)
                .await?
                .is_none()
        {
            return Err(self.not_found(id));
        }
        Ok(bundle)
    }

    async fn perform_operation(
        &self,
        name: &str,
        params: &Value,
        summary: SummaryMode,
        id: Option<&str>,
    ) -> ApiResult<Value> {
        let handler = self
            .operations
            .resolve(name, &self.resource_type)
            .ok_or_else(|| {
                ApiError::not_implemented(format!(
                    "Operation ${} is not available on {}",
                    name.trim_start_matches('$'),
                    self.resource_type
                ))
            })?;

        let ctx = OperationContext {
            resource_type: &self.resource_type,
            store: self.store.as_ref(),
            summary,
        };
        let result = match id {
            Some(id) => handler.handle_instance(&ctx, id, params).await,
            None => handler.handle_type(&ctx, params).await,
        };
        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronofhir_api::ErrorKind;
    use chronofhir_db_memory::InMemoryVersionStore;
    use serde_json::json;

    fn repo() -> StoreBackedRepository {
        StoreBackedRepository::new(
            "Patient",
            Arc::new(InMemoryVersionStore::new()),
            Arc::new(OperationRegistry::with_builtins()),
        )
    }

    fn filter(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn create_assigns_id_and_strips_server_meta() {
        let repo = repo();
        let out = repo
            .create(
                json!({"resourceType": "Patient", "meta": {"versionId": "77", "tag": []}}),
                WriteOptions::default(),
            )
            .await
            .unwrap();
        assert!(out.created);
        assert!(out.written);
        assert!(!out.resource.id.is_empty());
        assert_eq!(out.resource.version_id.get(), 1);
        let json = out.resource.to_json();
        assert_eq!(json["meta"]["versionId"], "1");
    }

    #[tokio::test]
    async fn body_validation() {
        let repo = repo();
        let err = repo
            .create(json!({"resourceType": "Observation"}), WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = repo.create(json!([1, 2]), WriteOptions::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = repo
            .create(json!({"id": "p1"}), WriteOptions::create_only())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "id must be empty for create");

        let err = repo
            .create(json!({"id": "bad id!"}), WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn if_none_exist_returns_the_existing_match() {
        let repo = repo();
        repo.create(json!({"id": "p1"}), WriteOptions::default()).await.unwrap();

        let opts = WriteOptions {
            if_none_exist: Some(filter(&[("_id", "p1")])),
            create_only: true,
            ..Default::default()
        };
        let out = repo.create(json!({"active": true}), opts).await.unwrap();
        assert!(!out.created);
        assert!(!out.written);
        assert_eq!(out.resource.id, "p1");
        assert_eq!(out.resource.version_id.get(), 1);
    }

    #[tokio::test]
    async fn if_match_without_parameters_is_rejected() {
        let repo = repo();
        let opts = WriteOptions {
            if_match: Some(Vec::new()),
            ..Default::default()
        };
        let err = repo.create(json!({}), opts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn conditional_delete_needs_a_supported_filter() {
        let repo = repo();
        repo.create(json!({"id": "p1"}), WriteOptions::default()).await.unwrap();

        let err = repo
            .delete(None, Some(&filter(&[("name", "Doe")])))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(repo.get("p1", None, SummaryMode::False).await.is_ok());

        let out = repo
            .delete(None, Some(&filter(&[("_id", "p1"), ("name", "Doe")])))
            .await
            .unwrap();
        assert!(matches!(out, DeleteOutcome::Deleted { ref tombstones } if tombstones.len() == 1));
    }

    #[tokio::test]
    async fn read_by_version_distinguishes_failures() {
        let repo = repo();
        repo.create(json!({"id": "p1"}), WriteOptions::default()).await.unwrap();
        repo.delete(Some("p1"), None).await.unwrap();

        let kind = |r: ApiResult<Resource>| r.unwrap_err().kind();
        assert_eq!(kind(repo.get("p1", Some("2"), SummaryMode::False).await), ErrorKind::Gone);
        assert_eq!(kind(repo.get("p1", Some("x"), SummaryMode::False).await), ErrorKind::BadRequest);
        assert_eq!(kind(repo.get("p1", Some("9"), SummaryMode::False).await), ErrorKind::NotFound);
        assert_eq!(kind(repo.get("zz", Some("1"), SummaryMode::False).await), ErrorKind::NotFound);
        assert!(repo.get("p1", Some("1"), SummaryMode::False).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_operation_is_not_implemented() {
        let repo = repo();
        let err = repo
            .perform_operation("$everything", &Value::Null, SummaryMode::False, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);

        let err = repo
            .perform_operation("versions", &Value::Null, SummaryMode::False, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }

    #[test]
    fn bundle_options_limits() {
        let opts = BundleOptions::new("http://x", 50, 100);
        assert_eq!(opts.limit(None), 50);
        assert_eq!(opts.limit(Some(7)), 7);
        assert_eq!(opts.limit(Some(1000)), 100);
        assert_eq!(BundleOptions::new("http://x", 500, 100).page_size, 100);

        let (count, summary) = opts
            .result_params(&filter(&[("_count", "3"), ("_summary", "count")]))
            .unwrap();
        assert_eq!(count, Some(3));
        assert_eq!(summary, SummaryMode::Count);
        assert!(opts.result_params(&filter(&[("_count", "-1")])).is_err());
    }
}
