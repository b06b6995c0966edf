//! Global logger setup (`fern` over the `log` facade).

use std::{process, thread};

use chrono::Local;
use fern::Dispatch;
use serde_json::json;

use crate::config::{LogFormat, LoggingSettings};

/// Install the global logger: stdout always, plus the log file when
/// configured. Fails if a logger is already installed.
pub fn setup_logging(settings: &LoggingSettings) -> Result<(), fern::InitError> {
    let mut dispatch = base_dispatch(settings.format)
        .level(settings.level)
        .chain(std::io::stdout());

    if let Some(path) = &settings.file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}

fn base_dispatch(format: LogFormat) -> Dispatch {
    match format {
        LogFormat::Text => Dispatch::new().format(|out, msg, record| {
            out.finish(format_args!(
                "[{}][{:5}][{}][pid={}][tid={:?}] {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                process::id(),
                thread::current().id(),
                msg
            ))
        }),
        LogFormat::Json => Dispatch::new().format(|out, msg, record| {
            let line = json!({
                "ts": Local::now().to_rfc3339(),
                "level": record.level().as_str(),
                "target": record.target(),
                "pid": process::id(),
                "message": msg.to_string(),
            });
            out.finish(format_args!("{line}"))
        }),
    }
}
