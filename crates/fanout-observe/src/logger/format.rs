use std::{fmt, str::FromStr};

use crate::logger::error::LoggerError;

/// Output format of the subscriber, spelled the way [`LOG_FORMAT_ENV`] expects it.
///
/// [`LOG_FORMAT_ENV`]: crate::LOG_FORMAT_ENV
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LoggerFormat {
    #[default]
    Text,
    /// One JSON object per event; run and worker span fields are included.
    Json,
    Journald,
}

impl LoggerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }

    /// Whether events go through the stderr `fmt` layer.
    pub fn writes_stderr(self) -> bool {
        !matches!(self, LoggerFormat::Journald)
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "plain" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            "journald" | "journal" if cfg!(all(target_os = "linux", feature = "journald")) => {
                Ok(LoggerFormat::Journald)
            }
            "journald" | "journal" => Err(LoggerError::JournaldNotSupported),
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}
