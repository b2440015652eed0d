mod config;
mod error;
mod format;
mod log;

pub use config::{LOG_ENV, LOG_FORMAT_ENV, LoggerConfig};
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the global `tracing` subscriber described by `cfg`.
///
/// Events are written to stderr; stdout of worker processes carries protocol frames.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(cfg)
}
