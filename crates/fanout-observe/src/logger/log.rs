use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Builds one registry with exactly one output layer enabled and installs it globally.
///
/// The stderr layers never touch stdout, which carries protocol frames in worker processes.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;

    let text = (cfg.format == LoggerFormat::Text).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
    });
    let json = (cfg.format == LoggerFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
    });
    let journald = mk_journald(cfg.format)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(journald)
        .try_init()
        .map_err(as_error)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") || s.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald(format: LoggerFormat) -> Result<Option<tracing_journald::Layer>, LoggerError> {
    if format != LoggerFormat::Journald {
        return Ok(None);
    }
    tracing_journald::layer()
        .map(|layer| Some(layer.with_syslog_identifier("fanout".to_string())))
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald(
    format: LoggerFormat,
) -> Result<Option<tracing_subscriber::layer::Identity>, LoggerError> {
    match format {
        LoggerFormat::Journald => Err(LoggerError::JournaldNotSupported),
        _ => Ok(None),
    }
}
