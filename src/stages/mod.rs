//! Pluggable pipeline roles.
//! -----------------------------------------------------------------------------
//! Four capability traits make up the pipeline:
//!   • `Source`   – long-running producer feeding the bounded queue.
//!   • `Enricher` – adds fields to an event in place.
//!   • `Detector` – turns a (read-only) event into zero or more verdicts.
//!   • `Enforcer` – acts on a threat verdict, honouring dry-run.
//!
//! The engine only ever sees these traits; variants are picked from the
//! configuration by [`registry`] and held in ordered lists.

pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::comms::{EventPublisher, Shutdown};
use crate::model::{DetectionResult, Event};

/// Failure of one stage on one item. Never aborts the pipeline.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

#[async_trait]
pub trait Source: Send + Sync + 'static {
    /// Display name for metrics / logs.
    fn name(&self) -> &str;

    /// Run until `shutdown` fires, the queue closes, or a fatal error.
    ///
    /// Transient failures are retried internally and never returned.
    async fn start(&self, shutdown: Shutdown, publisher: EventPublisher) -> Result<(), StageError>;

    /// Best-effort request to wind down; the shared signal is the primary path.
    async fn stop(&self) -> Result<(), StageError> {
        Ok(())
    }
}

#[async_trait]
pub trait Enricher: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Add fields to `event`. On error the event continues partially enriched.
    async fn enrich(&self, shutdown: &Shutdown, event: &mut Event) -> Result<(), StageError>;
}

#[async_trait]
pub trait Detector: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn detect(
        &self,
        shutdown: &Shutdown,
        event: &Event,
    ) -> Result<Vec<DetectionResult>, StageError>;
}

#[async_trait]
pub trait Enforcer: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Act on a threat. With `dry_run` set, simulate and log only.
    async fn enforce(
        &self,
        shutdown: &Shutdown,
        result: &DetectionResult,
        dry_run: bool,
    ) -> Result<(), StageError>;
}
