//! Named functions that workers can run.
//!
//! Closures cannot cross a process boundary, so every strategy refers to functions by
//! name. The same registry is built in the parent and in every worker process; the
//! parent uses it to validate a run, workers use it to execute tasks.

use std::{
    any::Any,
    collections::HashMap,
    fmt::Display,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use fanout_model::{
    ConfigError, FailureKind, Outcome, ResourceContext, ResultEnvelope, Task, TaskFailure,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, trace};

type TaskHandler = Arc<dyn Fn(Value) -> Result<Value, TaskFailure> + Send + Sync>;
type InitHandler = Arc<dyn Fn(Value) -> Result<(), TaskFailure> + Send + Sync>;
type ArgsCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
struct InitEntry {
    handler: InitHandler,
    check: ArgsCheck,
}

/// Registry of task functions and resource initializers, looked up by name.
#[derive(Clone, Default)]
pub struct FnRegistry {
    tasks: HashMap<String, TaskHandler>,
    inits: HashMap<String, InitEntry>,
}

impl FnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task function.
    ///
    /// `A` is the positional argument tuple, e.g. `(u64,)` or `(String, u32)`.
    /// An existing function with the same name is replaced.
    pub fn register<A, R, E, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        R: Serialize,
        E: Display,
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: TaskHandler = Arc::new(move |args: Value| {
            let args: A = decode_args(args)?;
            let value = f(args).map_err(|e| TaskFailure::raised(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| {
                TaskFailure::new(FailureKind::Raised, format!("result is not serializable: {e}"))
            })
        });
        trace!(target: "fanout.core.registry", %name, "function registered");
        self.tasks.insert(name, handler);
        self
    }

    /// Registers a resource initializer.
    ///
    /// Initializers run once per resource context, inside the worker bound to it.
    pub fn register_init<A, E, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: DeserializeOwned,
        E: Display,
        F: Fn(A) -> Result<(), E> + Send + Sync + 'static,
    {
        let name = name.into();
        let handler: InitHandler = Arc::new(move |args: Value| {
            let args: A = decode_args(args)?;
            f(args).map_err(|e| TaskFailure::new(FailureKind::InitFailed, e.to_string()))
        });
        let check: ArgsCheck = Arc::new(|args: &Value| {
            serde_json::from_value::<A>(args.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        trace!(target: "fanout.core.registry", %name, "initializer registered");
        self.inits.insert(name, InitEntry { handler, check });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn contains_init(&self, name: &str) -> bool {
        self.inits.contains_key(name)
    }

    /// Fails with a configuration error when `name` is not a registered function.
    pub fn ensure_function(&self, name: &str) -> Result<(), ConfigError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(ConfigError::UnknownFunction(name.to_string()))
        }
    }

    /// Checks that `name` is a registered initializer and every context's arguments fit it.
    pub fn validate_contexts(
        &self,
        name: &str,
        contexts: &[ResourceContext],
    ) -> Result<(), ConfigError> {
        let entry = self
            .inits
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInitializer(name.to_string()))?;
        if contexts.is_empty() {
            return Err(ConfigError::NoResourceContexts);
        }
        for ctx in contexts {
            (entry.check)(&ctx.init_args).map_err(|reason| ConfigError::InvalidInitArgs {
                context_id: ctx.context_id,
                reason,
            })?;
        }
        Ok(())
    }

    /// Runs one task, timing the call and capturing any failure or panic.
    pub fn invoke(&self, task: &Task) -> ResultEnvelope {
        let started = Instant::now();
        let outcome = match self.tasks.get(&task.function) {
            Some(handler) => {
                let handler = Arc::clone(handler);
                let args = task.args.clone();
                match panic::catch_unwind(AssertUnwindSafe(move || handler(args))) {
                    Ok(result) => Outcome::from(result),
                    Err(panic) => Outcome::Failure(TaskFailure::new(
                        FailureKind::Panicked,
                        panic_message(panic.as_ref()),
                    )),
                }
            }
            None => Outcome::Failure(TaskFailure::new(
                FailureKind::UnknownFunction,
                format!("function is not registered: {}", task.function),
            )),
        };
        let elapsed = started.elapsed();
        debug!(
            target: "fanout.core.registry",
            index = task.index,
            function = %task.function,
            ok = outcome.is_success(),
            ?elapsed,
            "task invoked"
        );
        ResultEnvelope::new(task.index, elapsed, outcome)
    }

    /// Runs the initializer for one resource context.
    pub fn initialize(&self, name: &str, ctx: &ResourceContext) -> Result<(), TaskFailure> {
        let entry = self.inits.get(name).ok_or_else(|| {
            TaskFailure::new(
                FailureKind::InitFailed,
                format!("initializer is not registered: {name}"),
            )
        })?;
        let handler = Arc::clone(&entry.handler);
        let args = ctx.init_args.clone();
        match panic::catch_unwind(AssertUnwindSafe(move || handler(args))) {
            Ok(result) => result,
            Err(panic) => Err(TaskFailure::new(
                FailureKind::InitFailed,
                panic_message(panic.as_ref()),
            )),
        }
    }
}

fn decode_args<A: DeserializeOwned>(args: Value) -> Result<A, TaskFailure> {
    serde_json::from_value(args)
        .map_err(|e| TaskFailure::new(FailureKind::InvalidArguments, e.to_string()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
