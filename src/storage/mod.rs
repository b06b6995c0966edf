//! Storage contract for events and detection results.
//!
//! The engine owns exactly one backend for its lifetime. Records are saved as
//! copies, so later in-place enrichment of an event is not reflected in what
//! was persisted at ingestion.

pub mod memory;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::model::{DetectionResult, Event};

pub use memory::MemoryStorage;

/// Field name → expected value; every entry must match (logical AND).
pub type Filters = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is closed")]
    Closed,

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("unknown filter field '{0}'")]
    UnknownFilter(String),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("unknown storage type '{0}'")]
    UnknownBackend(String),

    #[error("storage type '{0}' is not supported by this build")]
    Unsupported(String),
}

/// Append-and-index store shared by the pipeline and readers.
pub trait Storage: Send + Sync {
    /// Persist a copy of `event`, returning the id it is stored under.
    fn save_event(&self, event: &Event) -> Result<String, StorageError>;

    /// Persist a copy of `result`, returning the id it is stored under.
    fn save_detection(&self, result: &DetectionResult) -> Result<String, StorageError>;

    /// Copies of the events matching every filter, in insertion order.
    ///
    /// A field outside `id`, `source`, `type`, `domain` is rejected with
    /// `UnknownFilter` instead of being ignored, so a typo cannot silently
    /// widen the result to everything.
    fn get_events(&self, filters: &Filters) -> Result<Vec<Event>, StorageError>;

    /// As `get_events`; fields: `id`, `event_id`, `domain`, `brand`, `rule`,
    /// `is_threat`.
    fn get_detections(&self, filters: &Filters) -> Result<Vec<DetectionResult>, StorageError>;

    fn event_by_id(&self, id: &str) -> Result<Option<Event>, StorageError>;

    fn detection_by_id(&self, id: &str) -> Result<Option<DetectionResult>, StorageError>;

    /// Discard everything. Terminal: later calls fail with `Closed`.
    fn close(&self) -> Result<(), StorageError>;
}

/// Backends known to the configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    Sqlite,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory"   => Ok(StorageKind::Memory),
            "sqlite"   => Ok(StorageKind::Sqlite),
            "postgres" => Ok(StorageKind::Postgres),
            other      => Err(StorageError::UnknownBackend(other.into())),
        }
    }
}

/// Build the backend selected by configuration.
pub fn open_storage(kind: StorageKind) -> Result<Box<dyn Storage>, StorageError> {
    match kind {
        StorageKind::Memory => Ok(Box::new(MemoryStorage::new())),
        StorageKind::Sqlite => Err(StorageError::Unsupported("sqlite".into())),
        StorageKind::Postgres => Err(StorageError::Unsupported("postgres".into())),
    }
}

/// Convenience for building a one-entry filter.
pub fn filter(field: &str, value: impl Into<Value>) -> Filters {
    let mut filters = Filters::new();
    filters.insert(field.to_owned(), value.into());
    filters
}
