use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OperationType {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

/// Outcome of one mutation attempt, as published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_id: Uuid,
    pub operation_type: OperationType,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn succeeded(
        operation_type: OperationType,
        source_path: &str,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            operation_type,
            outcome: Outcome::Success,
            source_path: Some(source_path.to_string()),
            payload,
            error_message: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn failed(
        operation_type: OperationType,
        source_path: &str,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            operation_type,
            outcome: Outcome::Failed,
            source_path: Some(source_path.to_string()),
            payload: None,
            error_message: Some(error_message.into()),
            occurred_at: Utc::now(),
        }
    }
}
