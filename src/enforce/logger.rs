use async_trait::async_trait;

use crate::comms::Shutdown;
use crate::model::DetectionResult;
use crate::stages::{Enforcer, StageError};

pub const ENFORCER_NAME: &str = "logger";

/// Writes every threat to the log.
#[derive(Debug, Default, Clone)]
pub struct LoggerEnforcer;

impl LoggerEnforcer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Enforcer for LoggerEnforcer {
    fn name(&self) -> &str {
        ENFORCER_NAME
    }

    async fn enforce(
        &self,
        _shutdown: &Shutdown,
        result: &DetectionResult,
        dry_run: bool,
    ) -> Result<(), StageError> {
        if dry_run {
            log::info!(
                "[DRY RUN] would flag {} as {} look-alike (rule={}, confidence={:.2})",
                result.domain,
                result.brand,
                result.rule,
                result.confidence
            );
        } else {
            log::warn!(
                "THREAT: {} imitates {} (rule={}, confidence={:.2}, event={})",
                result.domain,
                result.brand,
                result.rule,
                result.confidence,
                result.event_id
            );
        }
        Ok(())
    }
}
