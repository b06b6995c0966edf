//! Append-only JSON-lines threat report.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::comms::Shutdown;
use crate::model::DetectionResult;
use crate::stages::{Enforcer, StageError};

pub const ENFORCER_NAME: &str = "threat_report";

/// Appends each threat as one JSON object per line. Dry-run only logs.
pub struct ThreatReportEnforcer {
    path: PathBuf,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl ThreatReportEnforcer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Enforcer for ThreatReportEnforcer {
    fn name(&self) -> &str {
        ENFORCER_NAME
    }

    async fn enforce(
        &self,
        _shutdown: &Shutdown,
        result: &DetectionResult,
        dry_run: bool,
    ) -> Result<(), StageError> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');

        if dry_run {
            log::info!(
                "[DRY RUN] would append {} to {:?}",
                String::from_utf8_lossy(&line[..line.len() - 1]),
                self.path
            );
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        log::debug!("threat {} appended to {:?}", result.domain, self.path);
        Ok(())
    }
}
