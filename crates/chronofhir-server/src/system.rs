//! System facade: every repository by type name, plus the system-wide
//! views.

use std::sync::Arc;

use chronofhir_api::{
    ApiError, ApiResult, Bundle, CapabilityStatement, CapabilityStatementBuilder,
    CapabilityStatementRestResource, SearchParam,
};
use chronofhir_core::{CoreError, SummaryMode, now_utc, validate_resource_type};
use chronofhir_storage::DynVersionStore;
use indexmap::IndexMap;
use serde_json::Value;

use crate::history::{HistoryLog, HistoryScope};
use crate::operations::{OperationRegistry, SystemOperationContext};
use crate::repository::{BundleOptions, ResourceRepository, StoreBackedRepository};

pub type DynRepository = Arc<dyn ResourceRepository>;

/// Constructed once at startup and handed to the dispatcher; there is no
/// global instance.
pub struct SystemFacade {
    repositories: IndexMap<String, DynRepository>,
    store: DynVersionStore,
    history: HistoryLog,
    operations: Arc<OperationRegistry>,
    backend: &'static str,
}

impl SystemFacade {
    pub fn builder(store: DynVersionStore) -> SystemFacadeBuilder {
        SystemFacadeBuilder::new(store)
    }

    pub fn repository(&self, resource_type: &str) -> ApiResult<DynRepository> {
        self.repositories
            .get(resource_type)
            .cloned()
            .ok_or_else(|| {
                ApiError::not_found(format!("Resource type '{resource_type}' is not supported"))
            })
    }

    /// Registered types, in registration order.
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.repositories.keys().map(String::as_str)
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }

    pub async fn system_history(
        &self,
        params: &[(String, String)],
        opts: &BundleOptions,
    ) -> ApiResult<Bundle> {
        self.history.bundle(HistoryScope::System, params, opts).await
    }

    /// Runs `$name` at the server base; unregistered names are
    /// `NotImplemented`.
    pub async fn perform_operation(
        &self,
        name: &str,
        params: &Value,
        summary: SummaryMode,
    ) -> ApiResult<Value> {
        let handler = self.operations.resolve_system(name).ok_or_else(|| {
            ApiError::not_implemented(format!(
                "Operation ${} is not available at system level",
                name.trim_start_matches('$')
            ))
        })?;
        let ctx = SystemOperationContext {
            store: self.store.as_ref(),
            summary,
        };
        Ok(handler.handle_system(&ctx, params).await?)
    }

    pub fn capabilities(&self) -> CapabilityStatement {
        let mut builder = CapabilityStatementBuilder::new_json_r4().date(now_utc().to_string());
        for rt in self.repositories.keys() {
            let mut resource = CapabilityStatementRestResource::versioned(rt.as_str())
                .with_search_params(vec![SearchParam::id()]);
            for (code, definition) in self.operations.available_for(rt) {
                resource = resource.with_operation(code, definition);
            }
            builder = builder.add_resource(resource);
        }
        for (code, definition) in self.operations.available_for_system() {
            builder = builder.add_system_operation(code, definition);
        }
        builder
            .add_system_interaction("batch")
            .add_system_interaction("history-system")
            .build()
    }
}

pub struct SystemFacadeBuilder {
    store: DynVersionStore,
    operations: Option<OperationRegistry>,
    resource_types: Vec<String>,
    custom: Vec<DynRepository>,
}

impl SystemFacadeBuilder {
    pub fn new(store: DynVersionStore) -> Self {
        Self {
            store,
            operations: None,
            resource_types: Vec::new(),
            custom: Vec::new(),
        }
    }

    /// Defaults to [`OperationRegistry::with_builtins`].
    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.operations = Some(operations);
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_types.push(resource_type.into());
        self
    }

    pub fn resource_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Registers a custom repository; it replaces a store-backed one of the
    /// same type.
    pub fn repository(mut self, repository: DynRepository) -> Self {
        self.custom.push(repository);
        self
    }

    pub fn build(self) -> Result<SystemFacade, CoreError> {
        let operations = Arc::new(self.operations.unwrap_or_else(OperationRegistry::with_builtins));
        let mut repositories: IndexMap<String, DynRepository> = IndexMap::new();

        for rt in self.resource_types {
            validate_resource_type(&rt)?;
            let repo = StoreBackedRepository::new(rt.clone(), self.store.clone(), operations.clone());
            repositories.insert(rt, Arc::new(repo));
        }
        for repo in self.custom {
            validate_resource_type(repo.resource_type())?;
            repositories.insert(repo.resource_type().to_string(), repo);
        }

        tracing::info!(
            backend = self.store.backend_name(),
            resource_types = repositories.len(),
            "system facade ready"
        );

        Ok(SystemFacade {
            repositories,
            history: HistoryLog::new(self.store.clone()),
            operations,
            backend: self.store.backend_name(),
            store: self.store,
        })
    }
}
