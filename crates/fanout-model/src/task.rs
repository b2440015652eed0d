use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of a task in the submitted argument list.
///
/// Indices are assigned by input order and never reused within a run.
pub type TaskIndex = usize;

/// One unit of work: a registered function applied to positional arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Input position, also the output slot.
    pub index: TaskIndex,
    /// Name of the function in the registry.
    pub function: String,
    /// Positional arguments, always a JSON array.
    pub args: Value,
}

impl Task {
    pub fn new(index: TaskIndex, function: impl Into<String>, args: Value) -> Self {
        Self {
            index,
            function: function.into(),
            args: normalize_args(args),
        }
    }

    /// Builds the task list for a run, assigning indices by input order.
    pub fn batch<I>(function: &str, args_list: I) -> Vec<Task>
    where
        I: IntoIterator<Item = Value>,
    {
        args_list
            .into_iter()
            .enumerate()
            .map(|(index, args)| Task::new(index, function, args))
            .collect()
    }
}

/// Wraps a lone argument into a one-element positional list.
///
/// Arrays are positional lists already and pass through untouched.
pub fn normalize_args(args: Value) -> Value {
    match args {
        Value::Array(_) => args,
        other => Value::Array(vec![other]),
    }
}
