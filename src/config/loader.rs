// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML file, expands `${VAR}` placeholders from the environment,
//! deserializes into `ConfigFile` and converts it into the runtime `Config`.

use std::{fs, path::Path};

use super::model::{Config, ConfigError, ConfigFile};

/// Load, expand, parse and validate the configuration at `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    log::debug!("Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt, |name| std::env::var(name).ok())?;
    log::info!("Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text, resolving placeholders through `lookup`.
pub fn parse<F>(text: &str, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let expanded = expand_env(text, lookup);
    let raw: ConfigFile = toml::from_str(&expanded)?;
    Config::try_from(raw)
}

/// Replace `${NAME}` with `lookup(NAME)`; unknown names expand to "".
/// An unterminated `${` is kept verbatim.
pub fn expand_env<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&lookup(&after[..end]).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Write the sample configuration to `path`; never overwrites.
pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    fs::write(path, sample_config())?;
    log::info!("Sample config written to {:?}", path);
    Ok(())
}

pub fn sample_config() -> &'static str {
    r#"# bpl-agent configuration

# Simulate enforcement instead of acting.
dry_run = false

[engine]
queue_capacity = 100
publish_timeout = "1s"
stats_interval = "30s"
# run_for = "1h"

[sources.certstream]
enabled = true
url = "wss://certstream.calidog.io/"
keywords = ["paypal", "amazon", "microsoft", "apple", "google"]
reconnect_delay = "5s"
idle_timeout = "60s"

[enrichment.domain_features]
enabled = true

[rules.keyword_lookalike]
enabled = true
threshold = 0.85

[rules.keyword_lookalike.brands]
paypal = ["paypal.com", "paypal.me"]
amazon = ["amazon.com", "amazon.co.uk", "amazon.de"]
microsoft = ["microsoft.com", "live.com", "office.com"]
apple = ["apple.com", "icloud.com"]
google = ["google.com", "gmail.com"]

[enforcement.logger]
enabled = true

[enforcement.threat_report]
enabled = false
path = "${BPL_REPORT_PATH}"

[storage]
type = "memory"  # memory (sqlite, postgres: not in this build)

[logging]
level = "info"
format = "text"  # text, json
enable = false
file = "bpl-agent.log"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn placeholders_are_expanded() {
        let out = expand_env("a=${A} b=${B} c=${MISSING}!", vars(&[("A", "1"), ("B", "two")]));
        assert_eq!(out, "a=1 b=two c=!");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(expand_env("x=${OPEN", vars(&[])), "x=${OPEN");
    }

    #[test]
    fn sample_config_parses() {
        let cfg = parse(sample_config(), vars(&[])).unwrap();
        let cs = cfg.certstream.expect("certstream enabled in sample");
        assert_eq!(cs.keywords.len(), 5);
        let la = cfg.lookalike.expect("lookalike enabled in sample");
        assert_eq!(la.brands["paypal"], vec!["paypal.com", "paypal.me"]);
        assert!(cfg.enforcement.logger);
        assert!(cfg.enforcement.threat_report.is_none());
    }

    #[test]
    fn env_values_reach_typed_config() {
        let text = "[enforcement.threat_report]\nenabled = true\npath = \"${REPORT}\"\n";
        let cfg = parse(text, vars(&[("REPORT", "/tmp/threats.jsonl")])).unwrap();
        assert_eq!(
            cfg.enforcement.threat_report,
            Some(PathBuf::from("/tmp/threats.jsonl"))
        );
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "dry_run = true").unwrap();
        let cfg = load(tmp.path()).unwrap();
        assert!(cfg.dry_run);
    }

    #[test]
    fn sample_is_not_written_over_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bpl.toml");
        write_sample_config(&path).unwrap();
        assert!(load(&path).is_ok());
        assert!(matches!(
            write_sample_config(&path),
            Err(ConfigError::AlreadyExists(_))
        ));
    }
}
