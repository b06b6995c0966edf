//! Process-wide pipeline counters and the periodic reporter.
//!
//! Counters live behind one `tokio::sync::RwLock`: the pipeline consumer is
//! the only writer, the reporter and any status readers share the lock.
//! Every increment is mirrored into a `metrics` counter so an embedding
//! application can export them without touching the lock.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::comms::Shutdown;

struct Counters {
    events_processed: u64,
    threats_found: u64,
    actions_live: u64,
    actions_dry_run: u64,
}

pub struct Statistics {
    counters: RwLock<Counters>,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub uptime: Duration,
    pub started_at: DateTime<Utc>,
    pub events_processed: u64,
    pub threats_found: u64,
    pub actions_live: u64,
    pub actions_dry_run: u64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(Counters {
                events_processed: 0,
                threats_found: 0,
                actions_live: 0,
                actions_dry_run: 0,
            }),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub async fn record_event(&self) {
        self.counters.write().await.events_processed += 1;
        metrics::counter!("events_processed_total").increment(1);
    }

    pub async fn record_threat(&self) {
        self.counters.write().await.threats_found += 1;
        metrics::counter!("threats_found_total").increment(1);
    }

    /// Count one successful enforcement in the bucket selected by `dry_run`.
    pub async fn record_action(&self, dry_run: bool) {
        let mut counters = self.counters.write().await;
        if dry_run {
            counters.actions_dry_run += 1;
        } else {
            counters.actions_live += 1;
        }
        drop(counters);

        let mode = if dry_run { "dry_run" } else { "live" };
        metrics::counter!("enforcement_actions_total", "mode" => mode).increment(1);
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let counters = self.counters.read().await;
        StatsSnapshot {
            uptime: self.started.elapsed(),
            started_at: self.started_at,
            events_processed: counters.events_processed,
            threats_found: counters.threats_found,
            actions_live: counters.actions_live,
            actions_dry_run: counters.actions_dry_run,
        }
    }
}

impl StatsSnapshot {
    /// One-line summary used by the reporter and at shutdown.
    pub fn summary(&self) -> String {
        let uptime = Duration::from_secs(self.uptime.as_secs());
        format!(
            "uptime={}, events={}, threats={}, actions={} (live) + {} (dry-run)",
            humantime::format_duration(uptime),
            self.events_processed,
            self.threats_found,
            self.actions_live,
            self.actions_dry_run,
        )
    }
}

/// Log a snapshot every `period` until `shutdown` fires.
///
/// A zero `period` is raised to one millisecond; `interval` rejects zero.
pub async fn report_loop(stats: &Statistics, period: Duration, shutdown: Shutdown) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = stats.snapshot().await;
                log::info!("stats: {}", snapshot.summary());
            }
        }
    }
    log::debug!("stats reporter stopped");
}
