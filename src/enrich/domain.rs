//! Lexical features of the event domain.

use async_trait::async_trait;
use serde_json::Value;

use crate::comms::Shutdown;
use crate::model::Event;
use crate::stages::{Enricher, StageError};

pub const ENRICHER_NAME: &str = "domain_features";

/// Adds `labels`, `tld`, `hyphens`, `digits` and `punycode` to the event
/// metadata. Pure string work, no I/O.
#[derive(Debug, Default, Clone)]
pub struct DomainFeatureEnricher;

impl DomainFeatureEnricher {
    pub fn new() -> Self {
        Self
    }
}

/// Features of one domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFeatures {
    pub labels: usize,
    pub tld: String,
    pub hyphens: usize,
    pub digits: usize,
    pub punycode: bool,
}

impl DomainFeatures {
    pub fn of(domain: &str) -> Self {
        let domain = domain.trim_end_matches('.');
        let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
        Self {
            labels: labels.len(),
            tld: if labels.len() > 1 {
                labels.last().map(|l| l.to_string()).unwrap_or_default()
            } else {
                String::new()
            },
            hyphens: domain.matches('-').count(),
            digits: domain.chars().filter(char::is_ascii_digit).count(),
            punycode: labels.iter().any(|l| l.starts_with("xn--")),
        }
    }
}

impl DomainFeatures {
    /// Features as recorded in `event.metadata` by this enricher; keys that
    /// are missing (enricher disabled or failed) are computed from the domain.
    pub fn from_event(event: &Event) -> Self {
        let meta = &event.metadata;
        let computed = Self::of(event.domain());
        let count = |key: &str, fallback: usize| {
            meta.get(key)
                .and_then(Value::as_u64)
                .map_or(fallback, |n| n as usize)
        };
        Self {
            labels: count("labels", computed.labels),
            hyphens: count("hyphens", computed.hyphens),
            digits: count("digits", computed.digits),
            punycode: meta
                .get("punycode")
                .and_then(Value::as_bool)
                .unwrap_or(computed.punycode),
            tld: meta
                .get("tld")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or(computed.tld),
        }
    }
}

#[async_trait]
impl Enricher for DomainFeatureEnricher {
    fn name(&self) -> &str {
        ENRICHER_NAME
    }

    async fn enrich(&self, _shutdown: &Shutdown, event: &mut Event) -> Result<(), StageError> {
        if event.domain().is_empty() {
            return Err(StageError::Failed("event has no domain".into()));
        }

        let f = DomainFeatures::of(event.domain());
        let meta = &mut event.metadata;
        meta.insert("labels".into(), Value::from(f.labels));
        meta.insert("tld".into(), Value::from(f.tld));
        meta.insert("hyphens".into(), Value::from(f.hyphens));
        meta.insert("digits".into(), Value::from(f.digits));
        meta.insert("punycode".into(), Value::from(f.punycode));
        Ok(())
    }
}
