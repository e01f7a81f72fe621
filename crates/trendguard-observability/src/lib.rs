//! Trendguard Observability
//!
//! Structured logging setup shared by the binaries.

pub mod logging;

pub use logging::{
    init_default_logging, init_logging, settings_from_env, LogFormat, LOG_FORMAT_ENV,
    LOG_LEVEL_ENV,
};
