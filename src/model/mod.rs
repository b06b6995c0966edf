//! Value types flowing through the pipeline.

pub mod detection;
pub mod event;

pub use detection::DetectionResult;
pub use event::{Event, Fields, CERTIFICATE_UPDATE};
