//! Explicit wiring of slave sources.
//!
//! Local services, remote clients, constant dictionaries and model metadata
//! are registered by name at startup. Remote clients may be registered after
//! the local pass has already compiled, which is why the schema registry
//! loads remote relations in a separate pass.

use crate::source::{ConstDict, LocalService};
use crate::store::RemoteClient;
use relmodel_core::EntityMeta;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
pub struct ServiceRegistry {
    models: RwLock<HashMap<String, Arc<EntityMeta>>>,
    local: RwLock<HashMap<String, Arc<LocalService>>>,
    remote: RwLock<HashMap<String, Arc<dyn RemoteClient>>>,
    dicts: RwLock<HashMap<String, Arc<ConstDict>>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local: Vec<String> = self
            .local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let remote: Vec<String> = self
            .remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ServiceRegistry")
            .field("local", &local)
            .field("remote", &remote)
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register model metadata without a local service (e.g. a remote slave model).
    pub fn register_model(&self, meta: Arc<EntityMeta>) {
        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(meta.name.clone(), meta);
    }

    /// Register a local service under its entity name; its metadata is registered too.
    pub fn register_local(&self, service: Arc<LocalService>) {
        self.register_model(Arc::clone(service.meta()));
        tracing::debug!(entity = %service.name(), "Registered local service");
        self.local
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service.name().to_string(), service);
    }

    pub fn register_remote(&self, name: impl Into<String>, client: Arc<dyn RemoteClient>) {
        let name = name.into();
        tracing::debug!(client = %name, "Registered remote client");
        self.remote
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, client);
    }

    pub fn register_const_dict(&self, dict: ConstDict) {
        self.dicts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dict.name().to_string(), Arc::new(dict));
    }

    pub fn model(&self, name: &str) -> Option<Arc<EntityMeta>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn local_service(&self, name: &str) -> Option<Arc<LocalService>> {
        self.local
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn remote_client(&self, name: &str) -> Option<Arc<dyn RemoteClient>> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn const_dict(&self, name: &str) -> Option<Arc<ConstDict>> {
        self.dicts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
