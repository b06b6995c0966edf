// src/main.rs

//! Agent entry-point.
//!
//! 1. Parse configuration & set up structured logging
//! 2. Build storage and every enabled stage
//! 3. Wire Ctrl-C (and the optional run deadline) to the shutdown signal
//! 4. Run the engine until shutdown, then log final statistics
//!
//! `bpl-agent init [PATH]` writes a sample configuration instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bpl_agent::comms::shutdown;
use bpl_agent::config::{self, Config};
use bpl_agent::logging::setup_logging;
use bpl_agent::Engine;

const DEFAULT_CONFIG: &str = "bpl.toml";

/// Brand-protection agent: watches certificate transparency for look-alike domains
#[derive(Parser, Debug)]
#[command(name = "bpl-agent")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Configuration file to run with
    #[arg(default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a sample configuration file
    Init {
        /// Where to write it (never overwritten)
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

fn init(path: &Path) -> Result<()> {
    config::write_sample_config(path)
        .with_context(|| format!("cannot write sample config to {}", path.display()))?;
    println!("Sample configuration written to {}", path.display());
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let engine = Engine::new(&config).context("engine setup failed")?;

    let (trigger, signal) = shutdown::channel();
    let signal = match config.engine.run_for {
        Some(limit) => {
            log::info!("Will stop after {}", humantime::format_duration(limit));
            signal.with_deadline(limit)
        }
        None => signal,
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep the trigger alive: dropping it would stop the engine.
            log::error!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        log::warn!("Ctrl-C received, shutting down");
        trigger.trigger();
    });

    if config.dry_run {
        log::warn!("DRY RUN: enforcement actions are simulated only");
    }
    engine.run(signal).await;
    engine.close().context("storage close failed")?;
    log::info!("Agent stopped cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::Init { path }) = cli.command {
        return init(&path);
    }
    let path = cli.config;

    let config = config::load(&path).with_context(|| {
        format!("cannot load {} (run `bpl-agent init` to create one)", path.display())
    })?;
    setup_logging(&config.logging).context("logging setup failed")?;
    log::info!("Agent bootstrap initiated");

    run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_to_bpl_toml() {
        let cli = Cli::try_parse_from(["bpl-agent"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG));
        assert!(cli.command.is_none());
    }

    #[test]
    fn explicit_config_path() {
        let cli = Cli::try_parse_from(["bpl-agent", "/etc/bpl/prod.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/bpl/prod.toml"));
    }

    #[test]
    fn init_takes_optional_path() {
        let cli = Cli::try_parse_from(["bpl-agent", "init"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { path }) if path == PathBuf::from(DEFAULT_CONFIG)));

        let cli = Cli::try_parse_from(["bpl-agent", "init", "custom.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Init { path }) if path == PathBuf::from("custom.toml")));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["bpl-agent", "--bogus"]).is_err());
    }
}
