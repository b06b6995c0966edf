//! Observed events as they travel through the pipeline.
//!
//! An `Event` is produced by a source, persisted once at ingestion, grown by
//! enrichers (keys are added to `data` / `metadata`, never removed) and is
//! read-only from the detection stage onward.
//!
//! The domain is normalised to lowercase on every way in: the constructor,
//! the setter-free API and deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Open-ended JSON object used for `data` and `metadata`.
pub type Fields = serde_json::Map<String, Value>;

/// Type tag used by certificate-transparency sources.
pub const CERTIFICATE_UPDATE: &str = "certificate_update";

/// One observed occurrence from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id; empty until the producer or storage assigns one.
    #[serde(default)]
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "lowercase")]
    domain: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Fields,
    #[serde(default)]
    pub metadata: Fields,
}

impl Event {
    /// Build an event stamped with the current time and an empty id.
    pub fn new(source: impl Into<String>, kind: impl Into<String>, domain: &str) -> Self {
        Self {
            id: String::new(),
            source: source.into(),
            kind: kind.into(),
            domain: domain.to_lowercase(),
            timestamp: Utc::now(),
            data: Fields::new(),
            metadata: Fields::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }

    /// Lowercase domain this event is about.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// String values of a metadata array, e.g. `matched_keywords`.
    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn lowercase<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.to_lowercase())
}
