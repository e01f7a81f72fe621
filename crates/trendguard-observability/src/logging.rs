//! Logging configuration using tracing
//!
//! The format and default level come from `LOG_FORMAT` and `LOG_LEVEL`;
//! `RUST_LOG` directives still override the level per target.

use std::fmt as std_fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
/// Environment variable selecting the default level
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Logging format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
    /// Compact format, one line per event
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl std_fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Compact => write!(f, "compact"),
        }
    }
}

/// Resolve format and level from the environment, falling back to defaults
/// for unset or unparseable values
pub fn settings_from_env() -> (LogFormat, Level) {
    settings_from(
        std::env::var(LOG_FORMAT_ENV).ok().as_deref(),
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
    )
}

fn settings_from(format: Option<&str>, level: Option<&str>) -> (LogFormat, Level) {
    let format = format.and_then(|f| f.parse().ok()).unwrap_or_default();
    let level = level
        .and_then(|l| Level::from_str(l.trim()).ok())
        .unwrap_or(Level::INFO);
    (format, level)
}

/// Install the global subscriber with the specified format
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(format: LogFormat, default_level: Level) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    }
}

/// Initialize logging from `LOG_FORMAT` / `LOG_LEVEL`
pub fn init_default_logging() -> Result<(), TryInitError> {
    let (format, level) = settings_from_env();
    init_logging(format, level)
}
