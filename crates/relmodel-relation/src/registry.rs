//! Per-entity relation schema registry.

use crate::info::EntityDeclaration;
use crate::schema::{RelationSchema, compile_local, compile_remote};
use crate::services::ServiceRegistry;
use relmodel_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Holds the compiled `RelationSchema` of every declared entity.
///
/// Startup runs `load_local_relations` once all local services are registered
/// and `load_remote_relations` once all remote clients are. Both passes are
/// idempotent: an entity already loaded by a pass is skipped.
#[derive(Debug)]
pub struct SchemaRegistry {
    services: Arc<ServiceRegistry>,
    schemas: RwLock<HashMap<String, Arc<RelationSchema>>>,
}

impl SchemaRegistry {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self {
            services,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Declare an entity. Re-declaring a known entity returns the existing schema.
    pub fn declare(&self, declaration: EntityDeclaration) -> Arc<RelationSchema> {
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            schemas
                .entry(declaration.name().to_string())
                .or_insert_with(|| Arc::new(RelationSchema::new(declaration))),
        )
    }

    pub fn schema_for(&self, entity: &str) -> Option<Arc<RelationSchema>> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<RelationSchema>> {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = schemas.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Compile local and constant-dictionary relations of every declared entity.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn load_local_relations(&self) -> Result<()> {
        for schema in self.snapshot() {
            if schema.is_local_loaded() {
                continue;
            }
            let relations = compile_local(schema.declaration(), &self.services)?;
            tracing::debug!(
                entity = %schema.name(),
                relations = relations.len(),
                "Compiled local relations"
            );
            schema.install_local(relations);
        }
        Ok(())
    }

    /// Compile remote relations of every declared entity.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn load_remote_relations(&self) -> Result<()> {
        for schema in self.snapshot() {
            if schema.is_remote_loaded() {
                continue;
            }
            let relations = compile_remote(schema.declaration(), &self.services)?;
            tracing::debug!(
                entity = %schema.name(),
                relations = relations.len(),
                "Compiled remote relations"
            );
            schema.install_remote(relations);
        }
        Ok(())
    }
}
