pub mod config;
pub mod db;
pub mod readiness;
pub mod redis_bus;
pub mod store;

pub use crate::config::{ServiceConfig, StoreBackend};
pub use db::{connect_database, ensure_database, ensure_schema};
pub use readiness::{Readiness, ReadinessPolicy, wait_ready};
pub use redis_bus::RedisBus;
pub use store::PgRecordStore;
