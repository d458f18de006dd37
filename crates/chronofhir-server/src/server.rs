use std::sync::Arc;

use anyhow::Context;
use chronofhir_core::{RequestContext, RequestContextBuilder};
use chronofhir_db_fs::DirectoryVersionStore;
use chronofhir_db_memory::InMemoryVersionStore;
use chronofhir_storage::DynVersionStore;

use crate::config::{AppConfig, StorageBackend, StorageConfig};
use crate::dispatcher::Dispatcher;
use crate::operations::OperationRegistry;
use crate::system::SystemFacade;

/// A wired-up server: store, facade and dispatcher built from one config.
pub struct ChronoServer {
    config: AppConfig,
    facade: Arc<SystemFacade>,
    dispatcher: Dispatcher,
}

pub struct ServerBuilder {
    config: AppConfig,
    store: Option<DynVersionStore>,
    operations: Option<OperationRegistry>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            operations: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses `store` instead of the backend named in the config.
    pub fn with_store(mut self, store: DynVersionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_operations(mut self, operations: OperationRegistry) -> Self {
        self.operations = Some(operations);
        self
    }

    pub async fn build(self) -> anyhow::Result<ChronoServer> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let store = match self.store {
            Some(store) => store,
            None => open_store(&self.config.storage).await?,
        };

        let mut facade = SystemFacade::builder(store)
            .resource_types(self.config.fhir.resource_types.iter().cloned());
        if let Some(operations) = self.operations {
            facade = facade.with_operations(operations);
        }
        let facade = Arc::new(facade.build().context("building system facade")?);

        let dispatcher = Dispatcher::new(facade.clone())
            .with_page_limits(self.config.search.default_count, self.config.search.max_count);

        tracing::info!(
            base_url = %self.config.base_url(),
            backend = facade.backend_name(),
            "server initialized"
        );

        Ok(ChronoServer {
            config: self.config,
            facade,
            dispatcher,
        })
    }
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<DynVersionStore> {
    match storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryVersionStore::new())),
        StorageBackend::Directory => {
            let root = storage
                .directory
                .as_deref()
                .context("storage.directory is required for the directory backend")?;
            let store = DirectoryVersionStore::open(root)
                .await
                .with_context(|| format!("opening version store at {root}"))?;
            Ok(Arc::new(store))
        }
    }
}

impl ChronoServer {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn facade(&self) -> &Arc<SystemFacade> {
        &self.facade
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// A context builder preset with the configured base address.
    pub fn request_context(&self) -> RequestContextBuilder {
        RequestContext::builder().base_uri(self.config.base_url())
    }
}
