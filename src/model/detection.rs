//! Verdicts produced by detectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::{Event, Fields};

/// Outcome of running one detector against one event.
///
/// Created by a detector, persisted by the engine and, when `is_threat` is
/// set, handed to every enforcer. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub id: String,
    /// Id of the originating event (not checked against storage).
    pub event_id: String,
    pub domain: String,
    pub is_threat: bool,
    /// Score in `[0, 1]`.
    pub confidence: f64,
    pub brand: String,
    pub rule: String,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Fields,
}

impl DetectionResult {
    /// Build a result for `event`; `confidence` is clamped into `[0, 1]`.
    pub fn new(
        event: &Event,
        rule: impl Into<String>,
        brand: impl Into<String>,
        confidence: f64,
        is_threat: bool,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            id: String::new(),
            event_id: event.id.clone(),
            domain: event.domain().to_owned(),
            is_threat,
            confidence,
            brand: brand.into(),
            rule: rule.into(),
            detected_at: Utc::now(),
            metadata: Fields::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}
