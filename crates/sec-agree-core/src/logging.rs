//! Tracing subscriber setup for applications and tests embedding the engine
//!
//! The engine itself only emits `tracing` events. Binaries call
//! [`setup_logging`] once; tests can call it repeatedly since a second
//! installation is reported and ignored.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{SecAgreeError, SecAgreeResult};

/// Target of every event the engine emits
pub const ENGINE_TARGET: &str = "rvoip_sec_agree_core";

/// Logging setup for a process embedding the engine
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for everything outside the engine
    pub level: Level,
    /// Level for [`ENGINE_TARGET`]; falls back to `level`
    pub engine_level: Option<Level>,
    /// One JSON object per line, for log shippers
    pub json: bool,
    /// Source file and line of each event
    pub file_info: bool,
    /// Enter and exit of the per-agreement spans
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::WARN,
            engine_level: Some(Level::INFO),
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            engine_level: None,
            ..Default::default()
        }
    }

    /// Trace negotiation separately from the rest of the stack
    pub fn with_engine_level(mut self, level: Level) -> Self {
        self.engine_level = Some(level);
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Filter built from `RUST_LOG` when set, else from the configured levels
    pub fn env_filter(&self) -> SecAgreeResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let engine = self.engine_level.unwrap_or(self.level);
        let directive = format!("{}={}", ENGINE_TARGET, engine)
            .parse()
            .map_err(|e| SecAgreeError::config(format!("Invalid engine log directive: {}", e)))?;
        Ok(EnvFilter::default()
            .add_directive(self.level.into())
            .add_directive(directive))
    }
}

/// Install a global `fmt` subscriber
///
/// Returns `Ok(false)` when a global subscriber was already installed.
pub fn setup_logging(config: LoggingConfig) -> SecAgreeResult<bool> {
    let filter = config.env_filter()?;

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let mut subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init().is_ok()
    } else {
        subscriber.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            target: ENGINE_TARGET,
            "security-agreement logging at {} (engine {})",
            config.level,
            config.engine_level.unwrap_or(config.level)
        );
    }
    Ok(installed)
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> SecAgreeResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| SecAgreeError::config(format!("Invalid log level: {}", level)))
}
