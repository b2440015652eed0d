use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TaskIndex;

/// Why a task produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The function returned an error.
    Raised,
    /// The function panicked; the panic was caught inside the worker.
    Panicked,
    /// Arguments did not match the function signature.
    InvalidArguments,
    /// The worker does not know the requested function.
    UnknownFunction,
    /// The worker process died without reporting a result.
    WorkerCrashed,
    /// The worker moved on to other work without reporting the task.
    Unreported,
    /// The worker process could not be started.
    SpawnFailed,
    /// The resource initializer of the worker failed.
    InitFailed,
    /// No live worker remained to pick up the task.
    Abandoned,
}

impl FailureKind {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureKind::Raised => "task_raised",
            FailureKind::Panicked => "task_panicked",
            FailureKind::InvalidArguments => "invalid_arguments",
            FailureKind::UnknownFunction => "unknown_function",
            FailureKind::WorkerCrashed => "worker_crashed",
            FailureKind::Unreported => "unreported",
            FailureKind::SpawnFailed => "spawn_failed",
            FailureKind::InitFailed => "init_failed",
            FailureKind::Abandoned => "abandoned",
        }
    }

    /// Returns `true` for failures caused by the worker process rather than the task.
    pub fn is_worker_fault(&self) -> bool {
        matches!(
            self,
            FailureKind::WorkerCrashed
                | FailureKind::Unreported
                | FailureKind::SpawnFailed
                | FailureKind::InitFailed
                | FailureKind::Abandoned
        )
    }
}

/// How a worker process terminated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, when the process exited on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Terminating signal number (unix only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (_, Some(sig)) => write!(f, "killed by signal {sig}"),
            (Some(code), None) => write!(f, "exit code {code}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Failure cause as it crosses a process boundary.
///
/// Built inside the worker from the original error; only plain data travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit: None,
            payload: None,
        }
    }

    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Raised, message)
    }

    pub fn crashed(exit: ExitInfo) -> Self {
        Self {
            kind: FailureKind::WorkerCrashed,
            message: format!("worker process terminated without reporting: {exit}"),
            exit: Some(exit),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_label(), self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// Result of a single task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Success(Value),
    Failure(TaskFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(f) => Some(f),
        }
    }

    pub fn into_result(self) -> Result<Value, TaskFailure> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failure(f) => Err(f),
        }
    }
}

impl From<Result<Value, TaskFailure>> for Outcome {
    fn from(r: Result<Value, TaskFailure>) -> Self {
        match r {
            Ok(v) => Outcome::Success(v),
            Err(f) => Outcome::Failure(f),
        }
    }
}

/// One task's result together with the time spent producing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub index: TaskIndex,
    pub elapsed: Duration,
    pub outcome: Outcome,
}

impl ResultEnvelope {
    pub fn new(index: TaskIndex, elapsed: Duration, outcome: Outcome) -> Self {
        Self {
            index,
            elapsed,
            outcome,
        }
    }

    pub fn failed(index: TaskIndex, elapsed: Duration, failure: TaskFailure) -> Self {
        Self::new(index, elapsed, Outcome::Failure(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exit_info_display() {
        let killed = ExitInfo {
            code: None,
            signal: Some(9),
        };
        assert_eq!(killed.to_string(), "killed by signal 9");
        assert!(!killed.is_clean());

        let clean = ExitInfo {
            code: Some(0),
            signal: None,
        };
        assert_eq!(clean.to_string(), "exit code 0");
        assert!(clean.is_clean());
    }

    #[test]
    fn crashed_failure_carries_exit_status() {
        let exit = ExitInfo {
            code: Some(134),
            signal: None,
        };
        let failure = TaskFailure::crashed(exit);
        assert_eq!(failure.kind, FailureKind::WorkerCrashed);
        assert_eq!(failure.exit, Some(exit));
        assert!(failure.kind.is_worker_fault());
        assert!(failure.to_string().starts_with("worker_crashed:"));
    }

    #[test]
    fn failure_survives_the_wire() {
        let failure = TaskFailure::raised("ValueError: x").with_payload(json!({"arg": 2}));
        let wire = serde_json::to_string(&Outcome::Failure(failure.clone())).unwrap();
        let back: Outcome = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.failure(), Some(&failure));
        assert!(!wire.contains("exit"));
    }

    #[test]
    fn outcome_accessors() {
        let ok = Outcome::from(Ok(json!(4)));
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&json!(4)));
        assert_eq!(ok.into_result(), Ok(json!(4)));

        let err = Outcome::from(Err(TaskFailure::raised("boom")));
        assert!(!err.is_success());
        assert_eq!(err.value(), None);
    }
}
