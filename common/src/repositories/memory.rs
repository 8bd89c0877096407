// In-memory store backed by a JSON snapshot
//
// Implements every repository trait plus a staged unit-of-work context. The
// worker binary loads it from a fixture file; tests build it directly.

use super::{
    CampusRepository, DefinedValueRepository, Entity, EntityKey, FinancialAccountRepository,
    GroupRepository, PersistenceContext, PersonRepository, WorkflowAttributeValues,
};
use crate::errors::{StoreError, ValidationError};
use crate::models::{
    Campus, Communication, DefinedValue, FinancialAccount, FinancialPledge, Group, Person,
    PersonAlias,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Everything the store holds, in the shape of the fixture file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub person_aliases: Vec<PersonAlias>,
    #[serde(default)]
    pub defined_values: Vec<DefinedValue>,
    #[serde(default)]
    pub campuses: Vec<Campus>,
    #[serde(default)]
    pub financial_accounts: Vec<FinancialAccount>,
    #[serde(default)]
    pub pledges: Vec<FinancialPledge>,
    #[serde(default)]
    pub communications: Vec<Communication>,
}

pub struct InMemoryStore {
    data: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
        }
    }

    #[instrument]
    pub async fn load_from_path(path: &Path) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)?;
        info!(
            groups = snapshot.groups.len(),
            people = snapshot.people.len(),
            "Store snapshot loaded"
        );
        Ok(Self::new(snapshot))
    }

    #[instrument(skip(self))]
    pub async fn save_to_path(&self, path: &Path) -> Result<(), StoreError> {
        let raw = {
            let data = self.data.read().await;
            serde_json::to_string_pretty(&*data)?
        };
        tokio::fs::write(path, raw).await?;
        info!("Store snapshot written");
        Ok(())
    }

    /// Copy of the current committed state
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.data.read().await.clone()
    }

    /// Open a unit of work against this store
    pub fn context(self: &Arc<Self>) -> MemoryContext {
        MemoryContext {
            store: Arc::clone(self),
            staged_adds: Vec::new(),
            staged_deletes: Vec::new(),
        }
    }
}

#[async_trait]
impl GroupRepository for InMemoryStore {
    async fn get(&self, guid: Uuid) -> Result<Option<Group>, StoreError> {
        let data = self.data.read().await;
        Ok(data.groups.iter().find(|g| g.guid == guid).cloned())
    }

    async fn child_groups(&self, parent_id: i64) -> Result<Vec<Group>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .groups
            .iter()
            .filter(|g| g.parent_group_id == Some(parent_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PersonRepository for InMemoryStore {
    async fn get_alias(&self, guid: Uuid) -> Result<Option<PersonAlias>, StoreError> {
        let data = self.data.read().await;
        Ok(data.person_aliases.iter().find(|a| a.guid == guid).cloned())
    }

    async fn get_person(&self, id: i64) -> Result<Option<Person>, StoreError> {
        let data = self.data.read().await;
        Ok(data.people.iter().find(|p| p.id == id).cloned())
    }
}

#[async_trait]
impl DefinedValueRepository for InMemoryStore {
    async fn get(&self, guid: Uuid) -> Result<Option<DefinedValue>, StoreError> {
        let data = self.data.read().await;
        Ok(data.defined_values.iter().find(|v| v.guid == guid).cloned())
    }
}

#[async_trait]
impl CampusRepository for InMemoryStore {
    async fn get(&self, guid: Uuid) -> Result<Option<Campus>, StoreError> {
        let data = self.data.read().await;
        Ok(data.campuses.iter().find(|c| c.guid == guid).cloned())
    }
}

#[async_trait]
impl FinancialAccountRepository for InMemoryStore {
    async fn get(&self, guid: Uuid) -> Result<Option<FinancialAccount>, StoreError> {
        let data = self.data.read().await;
        Ok(data.financial_accounts.iter().find(|a| a.guid == guid).cloned())
    }
}

/// Unit of work over an [`InMemoryStore`]
pub struct MemoryContext {
    store: Arc<InMemoryStore>,
    staged_adds: Vec<Entity>,
    staged_deletes: Vec<EntityKey>,
}

impl MemoryContext {
    pub fn has_pending_changes(&self) -> bool {
        !self.staged_adds.is_empty() || !self.staged_deletes.is_empty()
    }
}

fn contains(data: &StoreSnapshot, key: EntityKey) -> bool {
    match key {
        EntityKey::Pledge(guid) => data.pledges.iter().any(|p| p.guid == guid),
        EntityKey::Communication(guid) => data.communications.iter().any(|c| c.guid == guid),
    }
}

#[async_trait]
impl PersistenceContext for MemoryContext {
    async fn add(&mut self, entity: Entity) -> Result<EntityKey, StoreError> {
        let key = entity.key();
        self.staged_adds.push(entity);
        Ok(key)
    }

    async fn delete(&mut self, key: EntityKey) -> Result<(), StoreError> {
        // Deleting something added in this unit of work just unstages it
        if let Some(pos) = self.staged_adds.iter().position(|e| e.key() == key) {
            self.staged_adds.remove(pos);
            return Ok(());
        }
        self.staged_deletes.push(key);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut data = self.store.data.write().await;

        if let Some(missing) = self
            .staged_deletes
            .iter()
            .find(|key| !contains(&data, **key))
        {
            return Err(StoreError::NotFound(format!("{:?}", missing)));
        }

        let (adds, deletes) = (self.staged_adds.len(), self.staged_deletes.len());
        for entity in self.staged_adds.drain(..) {
            match entity {
                Entity::Pledge(p) => data.pledges.push(p),
                Entity::Communication(c) => data.communications.push(c),
            }
        }
        for key in self.staged_deletes.drain(..) {
            match key {
                EntityKey::Pledge(guid) => data.pledges.retain(|p| p.guid != guid),
                EntityKey::Communication(guid) => data.communications.retain(|c| c.guid != guid),
            }
        }

        debug!(adds, deletes, "Unit of work committed");
        Ok(())
    }
}

/// Fixed workflow attribute values, e.g. from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticWorkflowValues {
    values: HashMap<Uuid, String>,
}

impl StaticWorkflowValues {
    pub fn new(values: HashMap<Uuid, String>) -> Self {
        Self { values }
    }

    /// Build from a string-keyed map, rejecting keys that are not guids
    pub fn from_string_map(raw: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let mut values = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let guid =
                Uuid::parse_str(key.trim()).map_err(|e| ValidationError::InvalidFieldValue {
                    field: format!("workflow_values.{}", key),
                    reason: e.to_string(),
                })?;
            values.insert(guid, value.clone());
        }
        Ok(Self { values })
    }
}

impl WorkflowAttributeValues for StaticWorkflowValues {
    fn value(&self, attribute_guid: Uuid) -> Option<String> {
        self.values.get(&attribute_guid).cloned()
    }
}
