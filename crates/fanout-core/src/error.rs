use fanout_model::{ConfigError, TaskFailure, TaskIndex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("task {index} failed: {failure}")]
    TaskFailed { index: TaskIndex, failure: TaskFailure },

    #[error("task {0} reported more than once")]
    DuplicateResult(TaskIndex),

    #[error("task {0} is outside the submitted range")]
    UnknownIndex(TaskIndex),

    #[error("task {0} was never accounted for")]
    Unaccounted(TaskIndex),

    #[error("executor error: {0}")]
    Executor(String),
}

impl CoreError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config_error",
            CoreError::TaskFailed { .. } => "task_failed",
            CoreError::DuplicateResult(_) => "duplicate_result",
            CoreError::UnknownIndex(_) => "unknown_index",
            CoreError::Unaccounted(_) => "unaccounted_task",
            CoreError::Executor(_) => "executor_error",
        }
    }
}
