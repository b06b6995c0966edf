//! In-memory reference backend.
//!
//! Two append-only vectors with id → position indexes, behind a single
//! `RwLock`: saves take it exclusively, filtered reads share it.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value;

use super::{Filters, Storage, StorageError};
use crate::model::{DetectionResult, Event};

const EVENT_FIELDS: &[&str] = &["id", "source", "type", "domain"];
const DETECTION_FIELDS: &[&str] = &["id", "event_id", "domain", "brand", "rule", "is_threat"];

#[derive(Default)]
struct Tables {
    events: Vec<Event>,
    detections: Vec<DetectionResult>,
    event_index: HashMap<String, usize>,
    detection_index: HashMap<String, usize>,
}

pub struct MemoryStorage {
    // `None` once closed.
    tables: RwLock<Option<Tables>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { tables: RwLock::new(Some(Tables::default())) }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<Tables>>, StorageError> {
        let guard = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        if guard.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<Tables>>, StorageError> {
        let guard = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        if guard.is_none() {
            return Err(StorageError::Closed);
        }
        Ok(guard)
    }
}

/// `"{prefix}_{position}_{unix-nanos}"`; the position alone is unique under the lock.
fn generate_id(prefix: &str, position: usize) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}_{position}_{nanos}")
}

fn check_fields(filters: &Filters, known: &[&str]) -> Result<(), StorageError> {
    match filters.keys().find(|k| !known.contains(&k.as_str())) {
        Some(unknown) => Err(StorageError::UnknownFilter(unknown.clone())),
        None => Ok(()),
    }
}

fn str_eq(expected: &Value, actual: &str) -> bool {
    expected.as_str() == Some(actual)
}

fn event_matches(event: &Event, filters: &Filters) -> bool {
    filters.iter().all(|(field, expected)| match field.as_str() {
        "id" => str_eq(expected, &event.id),
        "source" => str_eq(expected, &event.source),
        "type" => str_eq(expected, &event.kind),
        "domain" => str_eq(expected, event.domain()),
        _ => false,
    })
}

fn detection_matches(result: &DetectionResult, filters: &Filters) -> bool {
    filters.iter().all(|(field, expected)| match field.as_str() {
        "id" => str_eq(expected, &result.id),
        "event_id" => str_eq(expected, &result.event_id),
        "domain" => str_eq(expected, &result.domain),
        "brand" => str_eq(expected, &result.brand),
        "rule" => str_eq(expected, &result.rule),
        "is_threat" => expected.as_bool() == Some(result.is_threat),
        _ => false,
    })
}

impl Storage for MemoryStorage {
    fn save_event(&self, event: &Event) -> Result<String, StorageError> {
        let mut guard = self.write()?;
        let tables = guard.as_mut().ok_or(StorageError::Closed)?;

        let position = tables.events.len();
        let mut stored = event.clone();
        if stored.id.is_empty() {
            stored.id = generate_id("event", position);
        }
        if tables.event_index.contains_key(&stored.id) {
            return Err(StorageError::DuplicateId(stored.id));
        }

        let id = stored.id.clone();
        tables.event_index.insert(id.clone(), position);
        tables.events.push(stored);
        Ok(id)
    }

    fn save_detection(&self, result: &DetectionResult) -> Result<String, StorageError> {
        let mut guard = self.write()?;
        let tables = guard.as_mut().ok_or(StorageError::Closed)?;

        let position = tables.detections.len();
        let mut stored = result.clone();
        if stored.id.is_empty() {
            stored.id = generate_id("detection", position);
        }
        if tables.detection_index.contains_key(&stored.id) {
            return Err(StorageError::DuplicateId(stored.id));
        }

        let id = stored.id.clone();
        tables.detection_index.insert(id.clone(), position);
        tables.detections.push(stored);
        Ok(id)
    }

    fn get_events(&self, filters: &Filters) -> Result<Vec<Event>, StorageError> {
        check_fields(filters, EVENT_FIELDS)?;
        let guard = self.read()?;
        let tables = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(tables
            .events
            .iter()
            .filter(|ev| event_matches(ev, filters))
            .cloned()
            .collect())
    }

    fn get_detections(&self, filters: &Filters) -> Result<Vec<DetectionResult>, StorageError> {
        check_fields(filters, DETECTION_FIELDS)?;
        let guard = self.read()?;
        let tables = guard.as_ref().ok_or(StorageError::Closed)?;

        Ok(tables
            .detections
            .iter()
            .filter(|res| detection_matches(res, filters))
            .cloned()
            .collect())
    }

    fn event_by_id(&self, id: &str) -> Result<Option<Event>, StorageError> {
        let guard = self.read()?;
        let tables = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(tables
            .event_index
            .get(id)
            .and_then(|&pos| tables.events.get(pos))
            .cloned())
    }

    fn detection_by_id(&self, id: &str) -> Result<Option<DetectionResult>, StorageError> {
        let guard = self.read()?;
        let tables = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(tables
            .detection_index
            .get(id)
            .and_then(|&pos| tables.detections.get(pos))
            .cloned())
    }

    fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.write()?;
        *guard = None;
        log::debug!("memory storage closed");
        Ok(())
    }
}
