use thiserror::Error;
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by a [`crate::RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(Uuid),
    #[error("company name {0:?} is already taken")]
    DuplicateName(String),
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn backend(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Failures reported by an [`crate::EventPublisher`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("delivery to {topic} failed: {message}")]
    Delivery { topic: String, message: String },
    #[error("delivery to {topic} timed out after {timeout_ms}ms")]
    Timeout { topic: String, timeout_ms: u64 },
}

/// Errors returned by the record service to its callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid data provided: {0}")]
    Validation(String),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
        }
    }
}
