//! Event sources.

pub mod certstream;
pub mod domains;

pub use certstream::{CertstreamSource, ConnectionState};
pub use domains::{extract_domains, KeywordFilter};
