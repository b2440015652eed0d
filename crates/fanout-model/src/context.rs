use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize_args;

/// Initialization data for one long-lived broker worker.
///
/// A context binds to exactly one worker process for the whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    pub context_id: usize,
    /// Positional arguments for the initializer, always a JSON array.
    pub init_args: Value,
}

impl ResourceContext {
    pub fn new(context_id: usize, init_args: Value) -> Self {
        Self {
            context_id,
            init_args: normalize_args(init_args),
        }
    }

    /// One context per initializer argument set, numbered from zero.
    pub fn from_args<I>(init_args: I) -> Vec<ResourceContext>
    where
        I: IntoIterator<Item = Value>,
    {
        init_args
            .into_iter()
            .enumerate()
            .map(|(id, args)| ResourceContext::new(id, args))
            .collect()
    }
}
