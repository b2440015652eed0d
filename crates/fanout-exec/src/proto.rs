//! Newline-delimited JSON frames between the parent and its worker processes.
//!
//! Parent → worker frames go to the worker's stdin, worker → parent frames to its stdout.
//! Every frame carries [`FRAME_MARKER`], normally at the start of a line; text in front of the
//! marker and any stdout line without one is ordinary program output, skipped by the reader.

use fanout_model::{ResourceContext, ResultEnvelope, Task, TaskFailure};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::ExecError;

pub const FRAME_MARKER: &str = "@@fanout ";

/// Initializer call a long-lived worker performs before pulling tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub function: String,
    pub context: ResourceContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ToWorker {
    /// First frame to a long-lived worker.
    Configure {
        /// Run every task in its own single-slot supervised process.
        isolate: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<InitRequest>,
    },
    Run { task: Task },
    /// The shared queue is empty; the worker should exit.
    Drained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FromWorker {
    /// A long-lived worker asks for its next task.
    Ready,
    Done { envelope: ResultEnvelope },
    InitFailed { failure: TaskFailure },
}

/// Renders one frame line, newline included.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, ExecError> {
    let json = serde_json::to_string(frame)?;
    Ok(format!("{FRAME_MARKER}{json}\n"))
}

/// Parses one line; `None` when the line carries no frame.
///
/// The marker may follow unterminated program output (`print!` without a newline), so it is
/// searched for anywhere in the line; text before it is dropped.
pub fn decode<T: DeserializeOwned>(line: &str) -> Option<Result<T, ExecError>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let at = line.find(FRAME_MARKER)?;
    let body = &line[at + FRAME_MARKER.len()..];
    Some(serde_json::from_str(body).map_err(ExecError::from))
}
