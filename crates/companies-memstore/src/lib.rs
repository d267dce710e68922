use std::collections::HashMap;

use async_trait::async_trait;
use companies_core::{
    CompanyFields, CompanyRecord, DomainEvent, EventPublisher, PublishError, RecordStore,
    StoreError,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Process-local [`RecordStore`]. Name uniqueness is checked under the write
/// lock, so it holds for concurrent creates the same way a unique index does.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<Uuid, CompanyFields>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn name_taken(records: &HashMap<Uuid, CompanyFields>, name: &str, except: Option<Uuid>) -> bool {
    records
        .iter()
        .any(|(id, fields)| fields.name == name && Some(*id) != except)
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, fields: CompanyFields) -> Result<Uuid, StoreError> {
        let mut records = self.records.write().await;
        if name_taken(&records, &fields.name, None) {
            return Err(StoreError::DuplicateName(fields.name));
        }

        let id = Uuid::new_v4();
        records.insert(id, fields);
        Ok(id)
    }

    async fn update(&self, id: Uuid, fields: CompanyFields) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if !records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        if name_taken(&records, &fields.name, Some(id)) {
            return Err(StoreError::DuplicateName(fields.name));
        }

        records.insert(id, fields);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn get(&self, id: Uuid) -> Result<CompanyRecord, StoreError> {
        let records = self.records.read().await;
        records
            .get(&id)
            .cloned()
            .map(|fields| CompanyRecord { id, fields })
            .ok_or(StoreError::NotFound(id))
    }

    async fn exists(&self, name: &str) -> bool {
        let records = self.records.read().await;
        name_taken(&records, name, None)
    }
}

/// [`EventPublisher`] that keeps every delivered event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    delivered: RwLock<Vec<(String, DomainEvent)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered `(topic, event)` pairs in publish order.
    pub async fn delivered(&self) -> Vec<(String, DomainEvent)> {
        self.delivered.read().await.clone()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.delivered
            .read()
            .await
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError> {
        debug!(topic, event_id = %event.event_id, "recorded event");
        self.delivered
            .write()
            .await
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}
