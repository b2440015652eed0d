use thiserror::Error;

/// Errors detected before any worker starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown strategy: {0} (expected: inline|thread-pool|process-pool|supervised-process-pool)")]
    UnknownStrategy(String),
    #[error("function is not registered: {0}")]
    UnknownFunction(String),
    #[error("initializer is not registered: {0}")]
    UnknownInitializer(String),
    #[error("invalid initializer arguments for context {context_id}: {reason}")]
    InvalidInitArgs { context_id: usize, reason: String },
    #[error("at least one resource context is required")]
    NoResourceContexts,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("invalid reporter kind: {0} (expected: silent|print|log)")]
    InvalidReporter(String),
}
