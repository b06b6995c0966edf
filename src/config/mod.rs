//! Public API for configuration

pub mod loader;
pub mod model;

// Re-export the main entrypoints:
pub use loader::{load, parse, sample_config, write_sample_config};
pub use model::{
    CertstreamSettings, Config, ConfigError, EngineSettings, LogFormat, LoggingSettings,
    LookalikeSettings,
};
