//! Registry of named operations.
//!
//! Handlers are registered either for every resource type or for one type;
//! lookups prefer the type-specific registration. System-level handlers
//! live in their own table. The registry is built at startup and shared
//! read-only afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::builtin::{InstanceCountOperation, VersionsOperation};
use super::handler::{DynOperationHandler, OperationHandler};

#[derive(Default)]
pub struct OperationRegistry {
    /// Handlers available on every type, by code
    global: HashMap<String, DynOperationHandler>,
    /// Handlers for one type, by type then code
    by_type: HashMap<String, HashMap<String, DynOperationHandler>>,
    /// Handlers invoked at the server base, by code
    system: HashMap<String, DynOperationHandler>,
}

fn normalize(code: &str) -> &str {
    code.trim_start_matches('$')
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `$instance-count` and `$versions` for all types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(InstanceCountOperation);
        registry.register(VersionsOperation);
        registry
    }

    /// Registers a handler for every resource type.
    pub fn register(&mut self, handler: impl OperationHandler + 'static) {
        let handler: DynOperationHandler = Arc::new(handler);
        self.global
            .insert(normalize(handler.code()).to_string(), handler);
    }

    /// Registers a handler for one resource type only.
    pub fn register_for(
        &mut self,
        resource_type: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) {
        let handler: DynOperationHandler = Arc::new(handler);
        self.by_type
            .entry(resource_type.into())
            .or_default()
            .insert(normalize(handler.code()).to_string(), handler);
    }

    /// Registers a handler for `$code` at the server base.
    pub fn register_system(&mut self, handler: impl OperationHandler + 'static) {
        let handler: DynOperationHandler = Arc::new(handler);
        self.system
            .insert(normalize(handler.code()).to_string(), handler);
    }

    /// Finds the handler for `code` on `resource_type`; `code` may carry
    /// the `$` prefix.
    pub fn resolve(&self, code: &str, resource_type: &str) -> Option<DynOperationHandler> {
        let code = normalize(code);
        self.by_type
            .get(resource_type)
            .and_then(|ops| ops.get(code))
            .or_else(|| self.global.get(code))
            .cloned()
    }

    pub fn resolve_system(&self, code: &str) -> Option<DynOperationHandler> {
        self.system.get(normalize(code)).cloned()
    }

    /// `(code, definition)` of the system-level operations, sorted by code.
    pub fn available_for_system(&self) -> Vec<(String, String)> {
        let out: BTreeMap<String, String> = self
            .system
            .iter()
            .map(|(code, h)| (code.clone(), h.definition()))
            .collect();
        out.into_iter().collect()
    }

    /// `(code, definition)` of everything invocable on `resource_type`,
    /// sorted by code.
    pub fn available_for(&self, resource_type: &str) -> Vec<(String, String)> {
        let mut out: BTreeMap<String, String> = self
            .global
            .iter()
            .map(|(code, h)| (code.clone(), h.definition()))
            .collect();
        if let Some(ops) = self.by_type.get(resource_type) {
            out.extend(ops.iter().map(|(code, h)| (code.clone(), h.definition())));
        }
        out.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.by_type.is_empty() && self.system.is_empty()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut global: Vec<_> = self.global.keys().collect();
        global.sort();
        f.debug_struct("OperationRegistry")
            .field("global", &global)
            .field("typed", &self.by_type.keys().collect::<Vec<_>>())
            .field("system", &self.system.keys().collect::<Vec<_>>())
            .finish()
    }
}
