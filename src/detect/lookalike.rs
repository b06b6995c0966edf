//! Brand look-alike scoring.
//!
//! A domain containing a brand keyword is scored by summing weighted
//! signals. Lexical signals come from the `domain_features` enrichment when
//! it ran, otherwise they are computed here. Weights are kept in integer points (100 = certain) so that the
//! threshold comparison is exact.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::json;

use crate::comms::Shutdown;
use crate::config::LookalikeSettings;
use crate::enrich::domain::DomainFeatures;
use crate::model::{DetectionResult, Event};
use crate::stages::{Detector, StageError};

pub const RULE_NAME: &str = "keyword_lookalike";

const KEYWORD_POINTS: u32 = 60;
const HYPHEN_POINTS: u32 = 15;
const TOKEN_POINTS: u32 = 10;
const PUNYCODE_POINTS: u32 = 10;
const DIGIT_POINTS: u32 = 5;
const FULL_POINTS: u32 = 100;

/// Words phishing domains like to pair with a brand.
pub const PHISHING_TOKENS: &[&str] = &[
    "login", "secure", "verify", "account", "support", "update", "signin", "wallet",
];

pub struct KeywordLookalikeDetector {
    threshold: f64,
    /// lowercase brand → lowercase official domains
    brands: BTreeMap<String, Vec<String>>,
}

impl KeywordLookalikeDetector {
    pub fn new(settings: &LookalikeSettings) -> Self {
        let brands = settings
            .brands
            .iter()
            .map(|(brand, official)| {
                (
                    brand.to_lowercase(),
                    official.iter().map(|d| d.trim().to_lowercase()).collect(),
                )
            })
            .collect();
        Self { threshold: settings.threshold, brands }
    }

    /// Brands to evaluate for `event`: configured brands contained in the
    /// domain, then source-matched keywords not configured as brands.
    fn candidate_brands(&self, event: &Event) -> Vec<String> {
        let domain = event.domain();
        let mut brands: Vec<String> = self
            .brands
            .keys()
            .filter(|b| domain.contains(b.as_str()))
            .cloned()
            .collect();

        for keyword in event.metadata_strings("matched_keywords") {
            let keyword = keyword.to_lowercase();
            if domain.contains(&keyword) && !brands.contains(&keyword) {
                brands.push(keyword);
            }
        }
        brands
    }

    fn is_official(&self, brand: &str, domain: &str) -> bool {
        self.brands.get(brand).is_some_and(|official| {
            official.iter().any(|o| {
                domain == o
                    || domain
                        .strip_suffix(o.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
        })
    }

    fn score(&self, event: &Event, brand: &str) -> DetectionResult {
        let domain = event.domain();
        if self.is_official(brand, domain) {
            return DetectionResult::new(event, RULE_NAME, brand, 0.0, false)
                .with_metadata("official", true);
        }

        let mut points = KEYWORD_POINTS;
        let mut signals = vec!["brand_keyword"];

        let features = DomainFeatures::from_event(event);
        if features.hyphens > 0 {
            points += HYPHEN_POINTS;
            signals.push("hyphen");
        }
        let tokens: Vec<&str> = PHISHING_TOKENS
            .iter()
            .copied()
            .filter(|t| domain.contains(t))
            .collect();
        if !tokens.is_empty() {
            points += TOKEN_POINTS;
            signals.push("phishing_token");
        }
        if features.punycode {
            points += PUNYCODE_POINTS;
            signals.push("punycode");
        }
        if features.digits > 0 {
            points += DIGIT_POINTS;
            signals.push("digits");
        }

        let confidence = f64::from(points.min(FULL_POINTS)) / f64::from(FULL_POINTS);
        let is_threat = confidence >= self.threshold;
        DetectionResult::new(event, RULE_NAME, brand, confidence, is_threat)
            .with_metadata("signals", json!(signals))
            .with_metadata("tokens", json!(tokens))
    }
}

#[async_trait]
impl Detector for KeywordLookalikeDetector {
    fn name(&self) -> &str {
        RULE_NAME
    }

    async fn detect(
        &self,
        _shutdown: &Shutdown,
        event: &Event,
    ) -> Result<Vec<DetectionResult>, StageError> {
        let results: Vec<DetectionResult> = self
            .candidate_brands(event)
            .iter()
            .map(|brand| self.score(event, brand))
            .collect();

        for r in results.iter().filter(|r| r.is_threat) {
            log::debug!(
                "lookalike: {} imitates {} (confidence {:.2})",
                r.domain,
                r.brand,
                r.confidence
            );
        }
        Ok(results)
    }
}
