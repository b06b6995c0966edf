//! Configuration-driven stage construction.
//!
//! Only enabled variants are instantiated. Each role keeps its stages in
//! configured order; names must be unique within a role so log lines and
//! metrics can be attributed.

use std::sync::Arc;

use thiserror::Error;

use super::{Detector, Enforcer, Enricher, Source};
use crate::config::Config;
use crate::detect::KeywordLookalikeDetector;
use crate::enforce::{LoggerEnforcer, ThreatReportEnforcer};
use crate::enrich::DomainFeatureEnricher;
use crate::sources::CertstreamSource;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{role} already registered: {name}")]
    Duplicate { role: &'static str, name: String },
}

/// Ordered stage lists handed to the engine.
#[derive(Default)]
pub struct Stages {
    pub sources: Vec<Arc<dyn Source>>,
    pub enrichers: Vec<Arc<dyn Enricher>>,
    pub detectors: Vec<Arc<dyn Detector>>,
    pub enforcers: Vec<Arc<dyn Enforcer>>,
}

fn ensure_unique<'a>(
    role: &'static str,
    mut existing: impl Iterator<Item = &'a str>,
    name: &str,
) -> Result<(), RegistryError> {
    if existing.any(|n| n == name) {
        return Err(RegistryError::Duplicate { role, name: name.to_owned() });
    }
    Ok(())
}

impl Stages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate every stage enabled in `config`.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut stages = Self::new();

        if let Some(cs) = &config.certstream {
            stages.register_source(Arc::new(CertstreamSource::new(cs.clone())))?;
        }
        if config.enrichment.domain_features {
            stages.register_enricher(Arc::new(DomainFeatureEnricher::new()))?;
        }
        if let Some(la) = &config.lookalike {
            stages.register_detector(Arc::new(KeywordLookalikeDetector::new(la)))?;
        }
        if config.enforcement.logger {
            stages.register_enforcer(Arc::new(LoggerEnforcer::new()))?;
        }
        if let Some(path) = &config.enforcement.threat_report {
            stages.register_enforcer(Arc::new(ThreatReportEnforcer::new(path.clone())))?;
        }

        log::info!(
            "Stages: sources={:?} enrichers={:?} detectors={:?} enforcers={:?}",
            stages.source_names(),
            stages.enrichers.iter().map(|e| e.name()).collect::<Vec<_>>(),
            stages.detectors.iter().map(|d| d.name()).collect::<Vec<_>>(),
            stages.enforcers.iter().map(|e| e.name()).collect::<Vec<_>>(),
        );
        Ok(stages)
    }

    pub fn register_source(&mut self, source: Arc<dyn Source>) -> Result<(), RegistryError> {
        ensure_unique("source", self.sources.iter().map(|s| s.name()), source.name())?;
        self.sources.push(source);
        Ok(())
    }

    pub fn register_enricher(&mut self, enricher: Arc<dyn Enricher>) -> Result<(), RegistryError> {
        ensure_unique("enricher", self.enrichers.iter().map(|e| e.name()), enricher.name())?;
        self.enrichers.push(enricher);
        Ok(())
    }

    pub fn register_detector(&mut self, detector: Arc<dyn Detector>) -> Result<(), RegistryError> {
        ensure_unique("detector", self.detectors.iter().map(|d| d.name()), detector.name())?;
        self.detectors.push(detector);
        Ok(())
    }

    pub fn register_enforcer(&mut self, enforcer: Arc<dyn Enforcer>) -> Result<(), RegistryError> {
        ensure_unique("enforcer", self.enforcers.iter().map(|e| e.name()), enforcer.name())?;
        self.enforcers.push(enforcer);
        Ok(())
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_owned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        crate::config::parse(text, |_| None).unwrap()
    }

    #[test]
    fn empty_config_builds_nothing() {
        let stages = Stages::from_config(&config("")).unwrap();
        assert!(stages.sources.is_empty());
        assert!(stages.enrichers.is_empty());
        assert!(stages.detectors.is_empty());
        assert!(stages.enforcers.is_empty());
    }

    #[test]
    fn sample_config_builds_enabled_stages_in_order() {
        let stages = Stages::from_config(&config(crate::config::sample_config())).unwrap();
        assert_eq!(stages.source_names(), vec!["certstream"]);
        assert_eq!(stages.enrichers[0].name(), "domain_features");
        assert_eq!(stages.detectors[0].name(), "keyword_lookalike");
        let enforcers: Vec<&str> = stages.enforcers.iter().map(|e| e.name()).collect();
        assert_eq!(enforcers, vec!["logger"]);
    }

    #[test]
    fn both_enforcers_when_report_enabled() {
        let stages = Stages::from_config(&config(
            "[enforcement.logger]\nenabled = true\n\
             [enforcement.threat_report]\nenabled = true\npath = \"/tmp/t.jsonl\"\n",
        ))
        .unwrap();
        let enforcers: Vec<&str> = stages.enforcers.iter().map(|e| e.name()).collect();
        assert_eq!(enforcers, vec!["logger", "threat_report"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut stages = Stages::new();
        stages.register_enforcer(Arc::new(LoggerEnforcer::new())).unwrap();
        let err = stages.register_enforcer(Arc::new(LoggerEnforcer::new())).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { role: "enforcer", .. }));
    }
}
