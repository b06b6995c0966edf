//! Engine: owns storage, statistics and the stage lists, and runs them.
//!
//! `run` launches one task per source, one pipeline consumer and one
//! statistics reporter, all observing the same [`Shutdown`]. It returns only
//! after every one of them has finished.

pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::comms::{queue, Shutdown};
use crate::config::{Config, EngineSettings};
use crate::model::Event;
use crate::stages::registry::{RegistryError, Stages};
use crate::stats::{self, Statistics, StatsSnapshot};
use crate::storage::{self, Storage, StorageError};

pub use pipeline::Pipeline;

/// Fatal construction / lifecycle errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("stage setup error: {0}")]
    Registry(#[from] RegistryError),
}

pub struct Engine {
    settings: EngineSettings,
    stages: Arc<Stages>,
    storage: Arc<dyn Storage>,
    stats: Arc<Statistics>,
}

impl Engine {
    /// Build storage and every enabled stage from `config`.
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let storage: Arc<dyn Storage> = Arc::from(storage::open_storage(config.storage)?);
        let stages = Stages::from_config(config)?;
        Ok(Self::from_parts(config.engine.clone(), storage, stages))
    }

    /// Assemble an engine from already-built parts.
    pub fn from_parts(settings: EngineSettings, storage: Arc<dyn Storage>, stages: Stages) -> Self {
        Self {
            settings,
            stages: Arc::new(stages),
            storage,
            stats: Arc::new(Statistics::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.stages),
            Arc::clone(&self.storage),
            Arc::clone(&self.stats),
            self.settings.dry_run,
        )
    }

    /// Push one event through the pipeline outside of `run`.
    pub async fn process_event(&self, shutdown: &Shutdown, event: Event) {
        self.pipeline().process_event(shutdown, event).await;
    }

    /// Run until `shutdown` fires, then wait for every worker.
    pub async fn run(&self, shutdown: Shutdown) -> StatsSnapshot {
        let (publisher, rx) =
            queue::bounded(self.settings.queue_capacity, self.settings.publish_timeout);
        let mut workers = JoinSet::new();

        for source in &self.stages.sources {
            let source = Arc::clone(source);
            let signal = shutdown.clone();
            let publisher = publisher.clone();
            workers.spawn(async move {
                log::info!("Starting source: {}", source.name());
                if let Err(e) = source.start(signal, publisher).await {
                    log::error!("Source {} failed: {e}", source.name());
                }
                log::info!("Source {} exited", source.name());
            });
        }
        // The consumer sees end-of-queue once every source is done.
        drop(publisher);

        let pipeline = self.pipeline();
        let signal = shutdown.clone();
        workers.spawn(async move { pipeline.consume(rx, signal).await });

        let counters = Arc::clone(&self.stats);
        let period = self.settings.stats_interval;
        let signal = shutdown.clone();
        workers.spawn(async move { stats::report_loop(&counters, period, signal).await });

        log::info!(
            "Engine running: {} source(s), dry_run={}",
            self.stages.sources.len(),
            self.settings.dry_run
        );

        shutdown.cancelled().await;
        log::info!("Shutdown requested, stopping workers");
        for source in &self.stages.sources {
            if let Err(e) = source.stop().await {
                log::warn!("Source {} stop failed: {e}", source.name());
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                log::error!("Worker task ended abnormally: {e}");
            }
        }

        let snapshot = self.stats.snapshot().await;
        log::info!("Final stats: {}", snapshot.summary());
        snapshot
    }

    /// Release storage. Terminal for this engine.
    pub fn close(&self) -> Result<(), EngineError> {
        self.storage.close()?;
        Ok(())
    }
}
