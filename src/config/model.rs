// src/config/model.rs

//! Raw TOML mirror (`ConfigFile`) and the typed runtime `Config`.
//!
//! Every table is optional in the file; missing keys fall back to the
//! defaults below. Conversion into `Config` parses durations, the log level
//! and the storage backend, and rejects inconsistent settings.

use serde::Deserialize;
use std::{collections::BTreeMap, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

use crate::storage::{StorageError, StorageKind};

pub const DEFAULT_CERTSTREAM_URL: &str = "wss://certstream.calidog.io/";

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid log level '{0}' (must be: debug, info, warn, error)")]
    InvalidLevel(String),

    #[error("invalid log format '{0}' (must be: text, json)")]
    InvalidFormat(String),

    #[error("invalid storage: {0}")]
    Storage(#[from] StorageError),

    #[error("lookalike threshold must be between 0 and 1, got {0}")]
    ThresholdOutOfRange(f64),

    #[error("certstream source is enabled but has no keywords")]
    MissingKeywords,

    #[error("certstream source is enabled but has no url")]
    MissingUrl,

    #[error("engine.queue_capacity must be greater than zero")]
    ZeroCapacity,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("threat_report enforcer is enabled but has no path")]
    MissingReportPath,

    #[error("configuration file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

// ───── raw file layout ──────────────────────────────────────────────────────

/// Top-level document as deserialized from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub dry_run:     bool,
    pub engine:      EngineSection,
    pub sources:     SourcesSection,
    pub enrichment:  EnrichmentSection,
    pub rules:       RulesSection,
    pub enforcement: EnforcementSection,
    pub storage:     StorageSection,
    pub logging:     LoggingSection,
}

/// Mirror of the `[engine]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub queue_capacity:  usize,
    pub publish_timeout: String,
    pub stats_interval:  String,
    pub run_for:         Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            queue_capacity:  100,
            publish_timeout: "1s".into(),
            stats_interval:  "30s".into(),
            run_for:         None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub certstream: CertstreamSection,
}

/// Mirror of `[sources.certstream]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CertstreamSection {
    pub enabled:         bool,
    pub url:             String,
    pub keywords:        Vec<String>,
    pub reconnect_delay: String,
    pub idle_timeout:    String,
}

impl Default for CertstreamSection {
    fn default() -> Self {
        Self {
            enabled:         false,
            url:             DEFAULT_CERTSTREAM_URL.into(),
            keywords:        Vec::new(),
            reconnect_delay: "5s".into(),
            idle_timeout:    "60s".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnrichmentSection {
    pub domain_features: Toggle,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    pub keyword_lookalike: LookalikeSection,
}

/// Mirror of `[rules.keyword_lookalike]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LookalikeSection {
    pub enabled:   bool,
    pub threshold: f64,
    /// Brand keyword → official domains of that brand.
    pub brands:    BTreeMap<String, Vec<String>>,
}

impl Default for LookalikeSection {
    fn default() -> Self {
        Self { enabled: false, threshold: 0.85, brands: BTreeMap::new() }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnforcementSection {
    pub logger:        Toggle,
    pub threat_report: ThreatReportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ThreatReportSection {
    pub enabled: bool,
    pub path:    Option<String>,
}

/// A table whose only key is `enabled`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self { kind: "memory".into() }
    }
}

/// Mirror of the `[logging]` table
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level:  String,
    pub format: String,
    /// Also write to `file`.
    pub enable: bool,
    pub file:   Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: "info".into(), format: "text".into(), enable: false, file: None }
    }
}

// ───── typed runtime config ─────────────────────────────────────────────────

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub dry_run:     bool,
    pub engine:      EngineSettings,
    pub certstream:  Option<CertstreamSettings>,
    pub enrichment:  EnrichmentSettings,
    pub lookalike:   Option<LookalikeSettings>,
    pub enforcement: EnforcementSettings,
    pub storage:     StorageKind,
    pub logging:     LoggingSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub dry_run:         bool,
    pub queue_capacity:  usize,
    pub publish_timeout: Duration,
    pub stats_interval:  Duration,
    pub run_for:         Option<Duration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dry_run:         false,
            queue_capacity:  100,
            publish_timeout: Duration::from_secs(1),
            stats_interval:  Duration::from_secs(30),
            run_for:         None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertstreamSettings {
    pub url:             String,
    pub keywords:        Vec<String>,
    pub reconnect_delay: Duration,
    pub idle_timeout:    Duration,
}

impl CertstreamSettings {
    /// Settings with the default delays.
    pub fn new(url: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            url: url.into(),
            keywords,
            reconnect_delay: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSettings {
    pub domain_features: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookalikeSettings {
    pub threshold: f64,
    pub brands:    BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnforcementSettings {
    pub logger:        bool,
    pub threat_report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level:  log::LevelFilter,
    pub format: LogFormat,
    pub file:   Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: log::LevelFilter::Info, format: LogFormat::Text, file: None }
    }
}

/// Allow `"json"` → `LogFormat::Json`
impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other  => Err(ConfigError::InvalidFormat(other.into())),
        }
    }
}

fn parse_level(s: &str) -> Result<log::LevelFilter, ConfigError> {
    match s.to_lowercase().as_str() {
        "debug" => Ok(log::LevelFilter::Debug),
        "info"  => Ok(log::LevelFilter::Info),
        "warn"  => Ok(log::LevelFilter::Warn),
        "error" => Ok(log::LevelFilter::Error),
        other   => Err(ConfigError::InvalidLevel(other.into())),
    }
}

fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(s.trim())
        .map_err(|e| ConfigError::InvalidDuration(s.into(), e))
}

/// Like `parse_duration`, for settings where zero would spin or panic.
fn parse_nonzero(key: &'static str, s: &str) -> Result<Duration, ConfigError> {
    match parse_duration(s)? {
        d if d.is_zero() => Err(ConfigError::ZeroDuration(key)),
        d => Ok(d),
    }
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(raw: ConfigFile) -> Result<Self, Self::Error> {
        if raw.engine.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let engine = EngineSettings {
            dry_run:         raw.dry_run,
            queue_capacity:  raw.engine.queue_capacity,
            publish_timeout: parse_nonzero("engine.publish_timeout", &raw.engine.publish_timeout)?,
            stats_interval:  parse_nonzero("engine.stats_interval", &raw.engine.stats_interval)?,
            run_for:         raw.engine.run_for.as_deref().map(parse_duration).transpose()?,
        };

        let cs = raw.sources.certstream;
        let certstream = if cs.enabled {
            if cs.url.trim().is_empty() {
                return Err(ConfigError::MissingUrl);
            }
            let keywords: Vec<String> = cs
                .keywords
                .into_iter()
                .map(|k| k.trim().to_owned())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(ConfigError::MissingKeywords);
            }
            Some(CertstreamSettings {
                url:             cs.url,
                keywords,
                reconnect_delay: parse_duration(&cs.reconnect_delay)?,
                idle_timeout:    parse_nonzero("sources.certstream.idle_timeout", &cs.idle_timeout)?,
            })
        } else {
            None
        };

        let la = raw.rules.keyword_lookalike;
        let lookalike = if la.enabled {
            if !(0.0..=1.0).contains(&la.threshold) {
                return Err(ConfigError::ThresholdOutOfRange(la.threshold));
            }
            Some(LookalikeSettings { threshold: la.threshold, brands: la.brands })
        } else {
            None
        };

        let report = raw.enforcement.threat_report;
        let threat_report = if report.enabled {
            match report.path.filter(|p| !p.trim().is_empty()) {
                Some(p) => Some(PathBuf::from(p)),
                None => return Err(ConfigError::MissingReportPath),
            }
        } else {
            None
        };

        let logging = LoggingSettings {
            level:  parse_level(&raw.logging.level)?,
            format: raw.logging.format.parse()?,
            file:   raw.logging.enable.then(|| {
                PathBuf::from(raw.logging.file.as_deref().unwrap_or("bpl-agent.log"))
            }),
        };

        Ok(Config {
            dry_run: raw.dry_run,
            engine,
            certstream,
            enrichment: EnrichmentSettings { domain_features: raw.enrichment.domain_features.enabled },
            lookalike,
            enforcement: EnforcementSettings { logger: raw.enforcement.logger.enabled, threat_report },
            storage: raw.storage.kind.parse()?,
            logging,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(text: &str) -> Result<Config, ConfigError> {
        let raw: ConfigFile = toml::from_str(text)?;
        Config::try_from(raw)
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = convert("").unwrap();
        assert!(!cfg.dry_run);
        assert_eq!(cfg.engine, EngineSettings::default());
        assert!(cfg.certstream.is_none());
        assert!(cfg.lookalike.is_none());
        assert_eq!(cfg.storage, StorageKind::Memory);
        assert_eq!(cfg.logging, LoggingSettings::default());
    }

    #[test]
    fn certstream_durations_are_parsed() {
        let cfg = convert(
            r#"
            [sources.certstream]
            enabled = true
            keywords = ["paypal", "  ", "amazon"]
            reconnect_delay = "250ms"
            "#,
        )
        .unwrap();
        let cs = cfg.certstream.unwrap();
        assert_eq!(cs.url, DEFAULT_CERTSTREAM_URL);
        assert_eq!(cs.keywords, vec!["paypal", "amazon"]);
        assert_eq!(cs.reconnect_delay, Duration::from_millis(250));
        assert_eq!(cs.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn enabled_source_without_keywords_is_rejected() {
        let err = convert("[sources.certstream]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKeywords));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            convert("[engine]\nstats_interval = \"soon\"\n").unwrap_err(),
            ConfigError::InvalidDuration(s, _) if s == "soon"
        ));
        assert!(matches!(
            convert("[logging]\nlevel = \"loud\"\n").unwrap_err(),
            ConfigError::InvalidLevel(_)
        ));
        assert!(matches!(
            convert("[logging]\nformat = \"xml\"\n").unwrap_err(),
            ConfigError::InvalidFormat(_)
        ));
        assert!(matches!(
            convert("[storage]\ntype = \"redis\"\n").unwrap_err(),
            ConfigError::Storage(_)
        ));
        assert!(matches!(
            convert("[engine]\nqueue_capacity = 0\n").unwrap_err(),
            ConfigError::ZeroCapacity
        ));
        assert!(matches!(
            convert("[engine]\nstats_interval = \"0s\"\n").unwrap_err(),
            ConfigError::ZeroDuration("engine.stats_interval")
        ));
        assert!(matches!(
            convert("[engine]\npublish_timeout = \"0ms\"\n").unwrap_err(),
            ConfigError::ZeroDuration("engine.publish_timeout")
        ));
        assert!(matches!(
            convert(
                "[sources.certstream]\nenabled = true\nkeywords = [\"paypal\"]\nidle_timeout = \"0s\"\n"
            )
            .unwrap_err(),
            ConfigError::ZeroDuration("sources.certstream.idle_timeout")
        ));
        assert!(matches!(
            convert("[rules.keyword_lookalike]\nenabled = true\nthreshold = 1.5\n").unwrap_err(),
            ConfigError::ThresholdOutOfRange(_)
        ));
        assert!(matches!(
            convert("[enforcement.threat_report]\nenabled = true\n").unwrap_err(),
            ConfigError::MissingReportPath
        ));
    }

    #[test]
    fn disabled_sections_are_not_validated() {
        let cfg = convert(
            r#"
            [rules.keyword_lookalike]
            enabled = false
            threshold = 7.0
            "#,
        )
        .unwrap();
        assert!(cfg.lookalike.is_none());
    }

    #[test]
    fn dry_run_flows_into_engine_settings() {
        let cfg = convert("dry_run = true\n[engine]\nrun_for = \"10m\"\n").unwrap();
        assert!(cfg.engine.dry_run);
        assert_eq!(cfg.engine.run_for, Some(Duration::from_secs(600)));
    }
}
