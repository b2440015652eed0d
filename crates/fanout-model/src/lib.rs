mod context;
pub use context::ResourceContext;

mod error;
pub use error::ConfigError;

mod outcome;
pub use outcome::{ExitInfo, FailureKind, Outcome, ResultEnvelope, TaskFailure};

mod strategy;
pub use strategy::StrategyKind;

mod task;
pub use task::{Task, TaskIndex, normalize_args};
