//! Per-event pipeline pass.
//!
//! ```text
//!   dequeue ─▶ count ─▶ persist ─▶ enrich* ─▶ detect* ─▶ persist result
//!                                                          │ is_threat
//!                                                          ▼
//!                                                       enforce*
//! ```
//!
//! Every stage failure is logged and swallowed; one bad event or stage never
//! stops the consumer.

use std::sync::Arc;

use crate::comms::{EventReceiver, Shutdown};
use crate::model::{DetectionResult, Event};
use crate::stages::registry::Stages;
use crate::stats::Statistics;
use crate::storage::Storage;

/// Everything the consumer needs; cheap to clone into its task.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<Stages>,
    storage: Arc<dyn Storage>,
    stats: Arc<Statistics>,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(
        stages: Arc<Stages>,
        storage: Arc<dyn Storage>,
        stats: Arc<Statistics>,
        dry_run: bool,
    ) -> Self {
        Self { stages, storage, stats, dry_run }
    }

    /// Drain `rx` in FIFO order until cancellation or until every producer
    /// is gone. On cancellation the queue is closed so producers see it; the
    /// event being processed at that moment still completes its pass.
    pub async fn consume(&self, mut rx: EventReceiver, shutdown: Shutdown) {
        log::info!("Pipeline consumer started (dry_run={})", self.dry_run);

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };
            self.process_event(&shutdown, event).await;
        }

        rx.close();
        log::info!("Pipeline consumer stopped");
    }

    /// Run one event through every stage.
    pub async fn process_event(&self, shutdown: &Shutdown, mut event: Event) {
        self.stats.record_event().await;

        match self.storage.save_event(&event) {
            Ok(id) if event.id.is_empty() => event.id = id,
            Ok(_) => {}
            Err(e) => log::warn!("Failed to save event for {}: {e}", event.domain()),
        }

        for enricher in &self.stages.enrichers {
            if let Err(e) = enricher.enrich(shutdown, &mut event).await {
                log::warn!("Enricher {} failed on {}: {e}", enricher.name(), event.domain());
            }
        }

        let mut results: Vec<DetectionResult> = Vec::new();
        for detector in &self.stages.detectors {
            match detector.detect(shutdown, &event).await {
                Ok(found) => results.extend(found),
                Err(e) => {
                    log::warn!("Detector {} failed on {}: {e}", detector.name(), event.domain())
                }
            }
        }

        for result in results {
            self.handle_result(shutdown, result).await;
        }
    }

    /// Persist one verdict and, for threats, enforce the stored copy so
    /// enforcers see the id storage assigned.
    async fn handle_result(&self, shutdown: &Shutdown, mut result: DetectionResult) {
        match self.storage.save_detection(&result) {
            Ok(id) if result.id.is_empty() => result.id = id,
            Ok(_) => {}
            Err(e) => log::warn!("Failed to save detection for {}: {e}", result.domain),
        }
        if !result.is_threat {
            return;
        }

        self.stats.record_threat().await;
        log::info!(
            "Threat detected: {} (brand={}, rule={}, confidence={:.2})",
            result.domain,
            result.brand,
            result.rule,
            result.confidence
        );

        for enforcer in &self.stages.enforcers {
            match enforcer.enforce(shutdown, &result, self.dry_run).await {
                Ok(()) => self.stats.record_action(self.dry_run).await,
                Err(e) => log::error!(
                    "Enforcer {} failed on {}: {e}",
                    enforcer.name(),
                    result.domain
                ),
            }
        }
    }
}
