//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when it holds a valid filter; otherwise the configured
//! level applies. Output goes to stderr or, when configured, is appended to
//! a log file.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_lowercase().as_str() {
            "" | "text" | "t" => Ok(LogFormat::Text),
            "json" | "j" => Ok(LogFormat::Json),
            _ => Err(Error::InvalidEnum {
                field: "log format",
                value: input.to_string(),
            }),
        }
    }
}

/// Accepts `debug|d`, `info|i`, `warn|warning|w`, `error|err|e` and `off`.
pub fn parse_level(input: &str) -> Result<LevelFilter> {
    match input.trim().to_lowercase().as_str() {
        "trace" | "t" => Ok(LevelFilter::TRACE),
        "debug" | "d" => Ok(LevelFilter::DEBUG),
        "" | "info" | "i" => Ok(LevelFilter::INFO),
        "warn" | "warning" | "w" => Ok(LevelFilter::WARN),
        "error" | "err" | "e" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err(Error::InvalidEnum {
            field: "log level",
            value: input.to_string(),
        }),
    }
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter> {
    // Ignore invalid or huge RUST_LOG values
    let from_env = std::env::var("RUST_LOG").ok().and_then(|raw| {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > 4096 {
            return None;
        }
        EnvFilter::try_new(raw).ok()
    });
    if let Some(filter) = from_env {
        return Ok(filter);
    }
    let level = parse_level(&config.level)?;
    Ok(EnvFilter::default().add_directive(level.into()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let format = LogFormat::parse(&config.format)?;

    let mut fallback = None;
    let writer = if config.file.trim().is_empty() {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.file.trim())
        {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            Err(err) => {
                fallback = Some(err);
                BoxMakeWriter::new(std::io::stderr)
            }
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(writer))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init(),
    };
    installed.map_err(|err| Error::Logging(err.to_string()))?;

    if let Some(err) = fallback {
        tracing::warn!(file = %config.file, error = %err, "cannot open log file, logging to stderr");
    }
    Ok(())
}
