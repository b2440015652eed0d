use async_trait::async_trait;
use fanout_model::{ResultEnvelope, Task, TaskIndex};

/// Execution strategy seen by the dispatcher.
///
/// Tasks are queued with [`submit`](Executor::submit) and come back, in completion order,
/// from [`next_completed`](Executor::next_completed). An executor yields exactly one envelope per
/// submitted task and then `None`.
#[async_trait]
pub trait Executor: Send {
    /// Strategy tag for logs and progress lines.
    fn label(&self) -> &'static str;

    /// Queues a task; the returned handle is the task index.
    fn submit(&mut self, task: Task) -> TaskIndex;

    /// Waits for the next finished task, or `None` once everything submitted was returned.
    async fn next_completed(&mut self) -> Option<ResultEnvelope>;

    /// Releases every worker the executor still holds.
    async fn shutdown(&mut self);
}
