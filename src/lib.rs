// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod comms;
pub mod config;
pub mod detect;
pub mod enforce;
pub mod engine;
pub mod enrich;
pub mod logging;
pub mod model;
pub mod sources;
pub mod stages;
pub mod stats;
pub mod storage;

pub use engine::{Engine, EngineError};
