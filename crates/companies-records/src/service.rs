use std::sync::Arc;

use companies_core::{
    CompanyInput, CompanyPatch, CompanyRecord, DomainEvent, EventPublisher, OperationType,
    RecordStore, ServiceError, StoreError, UpdatePolicy, validate_new_company,
};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_TOPIC: &str = "data-changed";

/// Validates requests, applies them to the store and reports every mutation
/// attempt on the event bus.
///
/// Each mutating call publishes exactly one event, success or failure,
/// before it returns. A failed publish is logged and never changes the
/// result handed back to the caller.
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    update_policy: UpdatePolicy,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            publisher,
            topic: topic.into(),
            update_policy: UpdatePolicy::default(),
        }
    }

    pub fn with_update_policy(mut self, update_policy: UpdatePolicy) -> Self {
        self.update_policy = update_policy;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Creates a company from a JSON body and returns its new id.
    pub async fn create(&self, source_path: &str, body: &[u8]) -> Result<Uuid, ServiceError> {
        let result = self.try_create(body).await;
        let event = match &result {
            Ok(_) => DomainEvent::succeeded(OperationType::Created, source_path, None),
            Err(err) => DomainEvent::failed(OperationType::Created, source_path, err.to_string()),
        };
        self.emit(event).await;
        result
    }

    /// Applies a JSON update body to the company with `id`.
    ///
    /// The body is not validated beyond decoding; see [`UpdatePolicy`] for
    /// how missing fields are treated.
    pub async fn update(
        &self,
        source_path: &str,
        id: &str,
        body: &[u8],
    ) -> Result<(), ServiceError> {
        let result = self.try_update(id, body).await;
        let event = match &result {
            Ok(payload) => {
                DomainEvent::succeeded(OperationType::Updated, source_path, Some(payload.clone()))
            }
            Err(err) => DomainEvent::failed(OperationType::Updated, source_path, err.to_string()),
        };
        self.emit(event).await;
        result.map(|_| ())
    }

    pub async fn delete(&self, source_path: &str, id: &str) -> Result<(), ServiceError> {
        let result = self.try_delete(id).await;
        let event = match &result {
            Ok(()) => DomainEvent::succeeded(OperationType::Deleted, source_path, None),
            Err(err) => DomainEvent::failed(OperationType::Deleted, source_path, err.to_string()),
        };
        self.emit(event).await;
        result
    }

    /// Reads never publish.
    pub async fn get(&self, id: &str) -> Result<CompanyRecord, ServiceError> {
        let id = parse_id(id)?;
        self.store.get(id).await.map_err(|err| {
            warn!("get {id} failed: {err}");
            ServiceError::NotFound(err.to_string())
        })
    }

    async fn try_create(&self, body: &[u8]) -> Result<Uuid, ServiceError> {
        let input: CompanyInput = decode(body)?;
        let fields =
            validate_new_company(input).inspect_err(|err| warn!("create rejected: {err}"))?;

        if self.store.exists(&fields.name).await {
            warn!("create rejected: name {:?} already exists", fields.name);
            return Err(ServiceError::Conflict(format!(
                "name {:?} is already taken",
                fields.name
            )));
        }

        let id = self.store.create(fields).await.map_err(|err| {
            error!("create failed: {err}");
            match err {
                StoreError::DuplicateName(name) => {
                    ServiceError::Conflict(format!("name {name:?} is already taken"))
                }
                other => ServiceError::Store(other),
            }
        })?;

        info!("company {id} created");
        Ok(id)
    }

    async fn try_update(&self, id: &str, body: &[u8]) -> Result<Value, ServiceError> {
        let id = parse_id(id)?;
        let patch: CompanyPatch = decode(body)?;
        let payload = serde_json::to_value(&patch)
            .map_err(|err| ServiceError::Validation(err.to_string()))?;

        let fields = match self.update_policy {
            UpdatePolicy::Overwrite => patch.overwrite(),
            UpdatePolicy::Merge => {
                let current = self.store.get(id).await?;
                patch.merge_onto(current.fields)
            }
        };

        self.store.update(id, fields).await.inspect_err(|err| {
            error!("update {id} failed: {err}");
        })?;

        info!("company {id} updated");
        Ok(payload)
    }

    async fn try_delete(&self, id: &str) -> Result<(), ServiceError> {
        let id = parse_id(id)?;
        self.store.delete(id).await.inspect_err(|err| {
            error!("delete {id} failed: {err}");
        })?;

        info!("company {id} deleted");
        Ok(())
    }

    async fn emit(&self, event: DomainEvent) {
        if let Err(err) = self.publisher.publish(&self.topic, &event).await {
            error!(
                event_id = %event.event_id,
                "failed to publish {:?}/{:?} event: {err}",
                event.operation_type,
                event.outcome
            );
        }
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|err| ServiceError::Validation(format!("invalid id {raw:?}: {err}")))
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|err| ServiceError::Validation(format!("malformed body: {err}")))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use companies_core::{CompanyFields, Outcome, PublishError};
    use companies_memstore::{InMemoryRecordStore, RecordingPublisher};
    use serde_json::json;

    use super::*;

    const PATH: &str = "/api/v1/companies";

    struct Harness {
        store: Arc<InMemoryRecordStore>,
        publisher: Arc<RecordingPublisher>,
        service: RecordService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryRecordStore::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let service = RecordService::new(store.clone(), publisher.clone(), DEFAULT_TOPIC);
        Harness {
            store,
            publisher,
            service,
        }
    }

    fn acme() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": "Acme",
            "description": "Widgets",
            "employeesCount": 10,
            "isRegistered": true,
            "type": 1,
        }))
        .unwrap()
    }

    /// Store whose existence check always misses, as when a concurrent
    /// create lands between the check and the insert.
    struct RacingStore(InMemoryRecordStore);

    #[async_trait]
    impl RecordStore for RacingStore {
        async fn create(&self, fields: CompanyFields) -> Result<Uuid, StoreError> {
            self.0.create(fields).await
        }
        async fn update(&self, id: Uuid, fields: CompanyFields) -> Result<(), StoreError> {
            self.0.update(id, fields).await
        }
        async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
            self.0.delete(id).await
        }
        async fn get(&self, id: Uuid) -> Result<CompanyRecord, StoreError> {
            self.0.get(id).await
        }
        async fn exists(&self, _name: &str) -> bool {
            false
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl EventPublisher for FailingPublisher {
        async fn publish(&self, topic: &str, _event: &DomainEvent) -> Result<(), PublishError> {
            Err(PublishError::Delivery {
                topic: topic.to_string(),
                message: "broker unavailable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn create_publishes_one_success_event_without_payload() {
        let h = harness();

        let id = h.service.create(PATH, &acme()).await.unwrap();

        assert!(!id.is_nil());
        let delivered = h.publisher.delivered().await;
        assert_eq!(delivered.len(), 1);
        let (topic, event) = &delivered[0];
        assert_eq!(topic, DEFAULT_TOPIC);
        assert_eq!(event.operation_type, OperationType::Created);
        assert_eq!(event.outcome, Outcome::Success);
        assert_eq!(event.source_path.as_deref(), Some(PATH));
        assert!(event.payload.is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict_and_leaves_store_alone() {
        let h = harness();
        h.service.create(PATH, &acme()).await.unwrap();

        let err = h.service.create(PATH, &acme()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(h.store.len().await, 1);
        let events = h.publisher.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].operation_type, OperationType::Created);
        assert_eq!(events[1].outcome, Outcome::Failed);
        assert!(events[1].error_message.as_deref().unwrap().contains("Acme"));
    }

    #[tokio::test]
    async fn invalid_create_never_reaches_the_store() {
        let h = harness();
        let bodies = [
            json!({"employeesCount": 1, "isRegistered": true, "type": 1}),
            json!({"name": "x".repeat(16), "employeesCount": 1, "isRegistered": true, "type": 1}),
            json!({"name": "Acme", "description": "d".repeat(3001), "employeesCount": 1, "isRegistered": true, "type": 1}),
            json!({"name": "Acme", "isRegistered": true, "type": 1}),
            json!({"name": "Acme", "employeesCount": 1, "type": 1}),
            json!({"name": "Acme", "employeesCount": 1, "isRegistered": true}),
        ];

        for body in &bodies {
            let err = h
                .service
                .create(PATH, &serde_json::to_vec(body).unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{body}");
        }

        assert!(h.store.is_empty().await);
        let events = h.publisher.events().await;
        assert_eq!(events.len(), bodies.len());
        assert!(events.iter().all(|e| e.outcome == Outcome::Failed));
    }

    #[tokio::test]
    async fn malformed_create_body_is_a_validation_failure() {
        let h = harness();

        let err = h.service.create(PATH, b"not json").await.unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(h.publisher.events().await[0].outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn get_returns_what_create_stored() {
        let h = harness();
        let id = h.service.create(PATH, &acme()).await.unwrap();

        let record = h.service.get(&id.to_string()).await.unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.fields.name, "Acme");
        assert_eq!(record.fields.description.as_deref(), Some("Widgets"));
        assert_eq!(record.fields.employees_count, 10);
        assert!(record.fields.is_registered);
        assert_eq!(record.fields.company_type, 1);
        assert_eq!(h.publisher.events().await.len(), 1);
    }

    #[tokio::test]
    async fn get_distinguishes_bad_ids_from_missing_records() {
        let h = harness();

        let bad = h.service.get("not-a-uuid").await.unwrap_err();
        let missing = h.service.get(&Uuid::new_v4().to_string()).await.unwrap_err();

        assert!(matches!(bad, ServiceError::Validation(_)));
        assert!(matches!(missing, ServiceError::NotFound(_)));
        assert!(h.publisher.events().await.is_empty());
    }

    #[tokio::test]
    async fn partial_update_overwrites_missing_fields() {
        let h = harness();
        let id = h.service.create(PATH, &acme()).await.unwrap();

        h.service
            .update(PATH, &id.to_string(), br#"{"name":"Acme Ltd"}"#)
            .await
            .unwrap();

        let record = h.store.get(id).await.unwrap();
        assert_eq!(
            record.fields,
            CompanyFields {
                name: "Acme Ltd".to_string(),
                description: None,
                employees_count: 0,
                is_registered: false,
                company_type: 0,
            }
        );

        let event = &h.publisher.events().await[1];
        assert_eq!(event.operation_type, OperationType::Updated);
        assert_eq!(event.outcome, Outcome::Success);
        assert_eq!(event.payload.as_ref().unwrap()["name"], "Acme Ltd");
    }

    #[tokio::test]
    async fn merge_policy_keeps_missing_fields() {
        let h = harness();
        let service = RecordService::new(h.store.clone(), h.publisher.clone(), DEFAULT_TOPIC)
            .with_update_policy(UpdatePolicy::Merge);
        let id = service.create(PATH, &acme()).await.unwrap();

        service
            .update(PATH, &id.to_string(), br#"{"employeesCount":25}"#)
            .await
            .unwrap();

        let record = h.store.get(id).await.unwrap();
        assert_eq!(record.fields.name, "Acme");
        assert_eq!(record.fields.employees_count, 25);
        assert!(record.fields.is_registered);
    }

    #[tokio::test]
    async fn update_skips_create_validation() {
        let h = harness();
        let id = h.service.create(PATH, &acme()).await.unwrap();
        let long_name = "n".repeat(40);

        h.service
            .update(
                PATH,
                &id.to_string(),
                &serde_json::to_vec(&json!({"name": long_name})).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(h.store.get(id).await.unwrap().fields.name, long_name);
    }

    #[tokio::test]
    async fn update_failures_publish_failed_events() {
        let h = harness();

        let bad_id = h.service.update(PATH, "42", b"{}").await.unwrap_err();
        let missing = h
            .service
            .update(PATH, &Uuid::new_v4().to_string(), b"{}")
            .await
            .unwrap_err();

        assert!(matches!(bad_id, ServiceError::Validation(_)));
        assert!(matches!(missing, ServiceError::Store(StoreError::NotFound(_))));
        let events = h.publisher.events().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| {
            e.operation_type == OperationType::Updated
                && e.outcome == Outcome::Failed
                && e.error_message.is_some()
                && e.payload.is_none()
        }));
    }

    #[tokio::test]
    async fn delete_succeeds_once() {
        let h = harness();
        let id = h.service.create(PATH, &acme()).await.unwrap().to_string();

        h.service.delete(PATH, &id).await.unwrap();
        let second = h.service.delete(PATH, &id).await.unwrap_err();

        assert!(matches!(second, ServiceError::Store(StoreError::NotFound(_))));
        let outcomes: Vec<_> = h
            .publisher
            .events()
            .await
            .iter()
            .map(|e| (e.operation_type, e.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (OperationType::Created, Outcome::Success),
                (OperationType::Deleted, Outcome::Success),
                (OperationType::Deleted, Outcome::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn delete_with_bad_id_publishes_failure() {
        let h = harness();

        let err = h.service.delete(PATH, "nope").await.unwrap_err();

        assert!(matches!(err, ServiceError::Validation(_)));
        let events = h.publisher.events().await;
        assert_eq!(events[0].operation_type, OperationType::Deleted);
        assert_eq!(events[0].outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn store_constraint_catches_a_lost_race() {
        let store = Arc::new(RacingStore(InMemoryRecordStore::new()));
        let publisher = Arc::new(RecordingPublisher::new());
        let service = RecordService::new(store.clone(), publisher.clone(), DEFAULT_TOPIC);
        service.create(PATH, &acme()).await.unwrap();

        let err = service.create(PATH, &acme()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(store.0.len().await, 1);
        assert_eq!(publisher.events().await[1].outcome, Outcome::Failed);
    }

    #[tokio::test]
    async fn publish_failure_does_not_change_the_result() {
        let store = Arc::new(InMemoryRecordStore::new());
        let service = RecordService::new(store.clone(), Arc::new(FailingPublisher), DEFAULT_TOPIC);

        let id = service.create(PATH, &acme()).await.unwrap();

        assert_eq!(store.get(id).await.unwrap().fields.name, "Acme");
        assert!(service.delete(PATH, &id.to_string()).await.is_ok());
    }
}
