//! Order-preserving collection of a run.
//!
//! ```text
//! tasks ──► executor.submit() ──► next_completed() ──► OutputSlots[index]
//!                                        │
//!                                        └─► progress.update(elapsed)
//! ```
//!
//! Results arrive in completion order and land in the slot of their input index.
//! Task failures never stop the loop; with `raise_on_error` the first failure seen is
//! returned as an error only after every submitted task is accounted for.

use fanout_model::{Outcome, Task, TaskFailure, TaskIndex};
use fanout_observe::Progress;
use tracing::{debug, warn};

use crate::{CoreError, Executor, OutputSlots};

/// Runs `tasks` through `executor` and returns one outcome per task, in input order.
pub async fn dispatch(
    executor: &mut dyn Executor,
    tasks: Vec<Task>,
    progress: &mut dyn Progress,
    raise_on_error: bool,
) -> Result<Vec<Outcome>, CoreError> {
    let mut slots = OutputSlots::new(tasks.len());
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let label = executor.label();
    for task in tasks {
        executor.submit(task);
    }
    debug!(target: "fanout.core.dispatch", strategy = label, total = slots.total(), "tasks submitted");

    let collected = collect(executor, &mut slots, progress).await;
    executor.shutdown().await;
    progress.close();

    let first_failure = collected?;
    let outcomes = slots.finish()?;

    if raise_on_error && let Some((index, failure)) = first_failure {
        return Err(CoreError::TaskFailed { index, failure });
    }
    Ok(outcomes)
}

async fn collect(
    executor: &mut dyn Executor,
    slots: &mut OutputSlots,
    progress: &mut dyn Progress,
) -> Result<Option<(TaskIndex, TaskFailure)>, CoreError> {
    let mut first_failure = None;

    while !slots.is_complete() {
        let Some(env) = executor.next_completed().await else {
            warn!(
                target: "fanout.core.dispatch",
                filled = slots.filled(),
                total = slots.total(),
                "executor drained before every task was accounted for"
            );
            break;
        };

        progress.update(env.elapsed);
        if let Outcome::Failure(failure) = &env.outcome {
            warn!(
                target: "fanout.core.dispatch",
                index = env.index,
                kind = failure.kind.as_label(),
                error = %failure.message,
                "task failed"
            );
            if first_failure.is_none() {
                first_failure = Some((env.index, failure.clone()));
            }
        }
        slots.fill(env.index, env.outcome)?;
    }

    Ok(first_failure)
}
