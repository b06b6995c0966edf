//! Enrichers: add derived fields to events before detection.

pub mod domain;

pub use domain::DomainFeatureEnricher;
