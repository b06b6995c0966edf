//! Detectors: turn enriched events into verdicts.

pub mod lookalike;

pub use lookalike::KeywordLookalikeDetector;
