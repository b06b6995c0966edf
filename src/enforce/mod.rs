//! Enforcers: act on threat verdicts, or simulate in dry-run.

pub mod logger;
pub mod report;

pub use logger::LoggerEnforcer;
pub use report::ThreatReportEnforcer;
