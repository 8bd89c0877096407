// Repository layer: read-only lookups into the host platform's data store
// plus the unit-of-work context both operations write through.

pub mod memory;

use crate::errors::StoreError;
use crate::models::{
    Campus, Communication, DefinedValue, FinancialAccount, FinancialPledge, Group, Person,
    PersonAlias,
};
use async_trait::async_trait;
use uuid::Uuid;

pub use memory::{InMemoryStore, MemoryContext, StaticWorkflowValues};

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Group with its schedule, locations and members loaded
    async fn get(&self, guid: Uuid) -> Result<Option<Group>, StoreError>;

    /// Direct children of a group, fully loaded
    async fn child_groups(&self, parent_id: i64) -> Result<Vec<Group>, StoreError>;
}

#[async_trait]
pub trait PersonRepository: Send + Sync {
    async fn get_alias(&self, guid: Uuid) -> Result<Option<PersonAlias>, StoreError>;

    async fn get_person(&self, id: i64) -> Result<Option<Person>, StoreError>;
}

#[async_trait]
pub trait DefinedValueRepository: Send + Sync {
    async fn get(&self, guid: Uuid) -> Result<Option<DefinedValue>, StoreError>;
}

#[async_trait]
pub trait CampusRepository: Send + Sync {
    async fn get(&self, guid: Uuid) -> Result<Option<Campus>, StoreError>;
}

#[async_trait]
pub trait FinancialAccountRepository: Send + Sync {
    async fn get(&self, guid: Uuid) -> Result<Option<FinancialAccount>, StoreError>;
}

/// Attribute values of the running workflow, keyed by attribute guid
pub trait WorkflowAttributeValues: Send + Sync {
    fn value(&self, attribute_guid: Uuid) -> Option<String>;
}

/// Entities this crate writes
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Pledge(FinancialPledge),
    Communication(Communication),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::Pledge(p) => EntityKey::Pledge(p.guid),
            Entity::Communication(c) => EntityKey::Communication(c.guid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Pledge(Uuid),
    Communication(Uuid),
}

/// Unit of work. Nothing staged with `add`/`delete` is visible until `commit`.
#[async_trait]
pub trait PersistenceContext: Send {
    async fn add(&mut self, entity: Entity) -> Result<EntityKey, StoreError>;

    async fn delete(&mut self, key: EntityKey) -> Result<(), StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
