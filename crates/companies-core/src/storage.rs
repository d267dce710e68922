use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::{PublishError, StoreError},
    events::DomainEvent,
    models::{CompanyFields, CompanyRecord},
};

/// Keyed storage for companies. Implementations own the name uniqueness
/// constraint and report violations as [`StoreError::DuplicateName`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, fields: CompanyFields) -> Result<Uuid, StoreError>;
    /// Replaces every column of the record with `id`.
    async fn update(&self, id: Uuid, fields: CompanyFields) -> Result<(), StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<CompanyRecord, StoreError>;
    /// Advisory lookup. Lookup failures read as `false`.
    async fn exists(&self, name: &str) -> bool;
}

/// Delivers one event to a topic and waits for the transport to accept it.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError>;
}
