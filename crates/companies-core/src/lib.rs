pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod validation;

pub use error::{PublishError, ServiceError, StoreError};
pub use events::{DomainEvent, OperationType, Outcome};
pub use models::{
    CompanyFields, CompanyInput, CompanyPatch, CompanyPayload, CompanyRecord, MAX_DESCRIPTION_LEN,
    MAX_NAME_LEN, UpdatePolicy,
};
pub use storage::{EventPublisher, RecordStore};
pub use validation::validate_new_company;
