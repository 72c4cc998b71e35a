//! Entity directory.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use switchboard_core::envelope::now_millis;
use switchboard_core::ids::EntityId;
use switchboard_core::types::{Entity, EntityStatus};

use crate::errors::{EngineError, Result};

/// Registered entities keyed by id (creation order, since ids are UUID v7).
#[derive(Debug, Default)]
pub struct EntityDirectory {
    entities: RwLock<BTreeMap<EntityId, Entity>>,
}

impl EntityDirectory {
    /// Empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Register a new idle entity.
    pub fn insert(&self, id: EntityId, name: &str, tenant: Option<String>) -> Entity {
        let entity = Entity {
            id: id.clone(),
            name: name.to_owned(),
            status: EntityStatus::Idle,
            tenant,
            created_at: now_millis(),
        };
        let _ = self.entities.write().insert(id, entity.clone());
        entity
    }

    /// Entities visible to `tenant` (`None` sees all).
    pub fn list(&self, tenant: Option<&str>) -> Vec<Entity> {
        self.entities
            .read()
            .values()
            .filter(|e| visible(e, tenant))
            .cloned()
            .collect()
    }

    /// Look up one visible entity.
    pub fn get(&self, tenant: Option<&str>, id: &str) -> Result<Entity> {
        self.entities
            .read()
            .get(&EntityId::from(id))
            .filter(|e| visible(e, tenant))
            .cloned()
            .ok_or_else(|| EngineError::EntityNotFound(id.to_owned()))
    }

    /// Move a visible entity to `status`; returns the previous and new state.
    pub fn transition(
        &self,
        tenant: Option<&str>,
        id: &str,
        status: EntityStatus,
    ) -> Result<(EntityStatus, Entity)> {
        let mut entities = self.entities.write();
        let entity = entities
            .get_mut(&EntityId::from(id))
            .filter(|e| visible(e, tenant))
            .ok_or_else(|| EngineError::EntityNotFound(id.to_owned()))?;
        let previous = entity.status;
        entity.status = status;
        Ok((previous, entity.clone()))
    }
}

fn visible(entity: &Entity, tenant: Option<&str>) -> bool {
    match (tenant, entity.tenant.as_deref()) {
        (None, _) => true,
        (Some(scope), owner) => owner.is_none_or(|o| o == scope),
    }
}
