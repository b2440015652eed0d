use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Log filter directive read by [`LoggerConfig::from_env`].
pub const LOG_ENV: &str = "FANOUT_LOG";
/// Log format (`text`, `json`, `journald`) read by [`LoggerConfig::from_env`].
pub const LOG_FORMAT_ENV: &str = "FANOUT_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `fanout.exec=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LoggerFormat) -> Self {
        self.format = format;
        self
    }

    /// Defaults overridden by [`LOG_ENV`] and [`LOG_FORMAT_ENV`].
    ///
    /// Worker processes inherit both variables, so a parent configured this way gets the
    /// same logging from its workers.
    pub fn from_env() -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Ok(level) = std::env::var(LOG_ENV) {
            cfg.level = level;
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stderr().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}
