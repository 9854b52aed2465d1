//! Logging configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// `tracing` filter directive for the loom crates at this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "loom=debug",
            LogLevel::Info => "loom=info",
            LogLevel::Warning => "loom=warn",
            LogLevel::Error => "loom=error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
