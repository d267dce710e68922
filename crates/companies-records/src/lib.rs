mod service;

pub use service::{DEFAULT_TOPIC, RecordService};
