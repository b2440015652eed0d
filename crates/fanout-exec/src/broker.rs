use async_trait::async_trait;
use fanout_core::Executor;
use fanout_model::{ResourceContext, ResultEnvelope, Task, TaskIndex};

use crate::{Fleet, WorkerCommand};

/// Resource broker setup: which initializer binds each worker to its context.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub init_function: String,
    pub contexts: Vec<ResourceContext>,
    /// Run every task in a one-shot child of the bound worker.
    pub isolate_tasks: bool,
    pub command: WorkerCommand,
}

impl BrokerConfig {
    pub fn new(
        init_function: impl Into<String>,
        contexts: Vec<ResourceContext>,
        command: WorkerCommand,
    ) -> Self {
        Self {
            init_function: init_function.into(),
            contexts,
            isolate_tasks: true,
            command,
        }
    }

    pub fn with_isolation(mut self, isolate_tasks: bool) -> Self {
        self.isolate_tasks = isolate_tasks;
        self
    }
}

/// One long-lived worker per resource context, all pulling from one queue.
///
/// Each worker calls the initializer once with its context's arguments and exports the
/// context id to the tasks it runs. Isolated tasks inherit the worker's environment, so
/// an initializer that selects a device through an environment variable selects it for
/// every task that worker runs.
pub struct ResourceBroker {
    fleet: Fleet,
}

impl ResourceBroker {
    pub fn new(cfg: BrokerConfig) -> Self {
        Self {
            fleet: Fleet::broker(
                cfg.command,
                &cfg.init_function,
                &cfg.contexts,
                cfg.isolate_tasks,
            ),
        }
    }

    pub fn contexts(&self) -> usize {
        self.fleet.seats()
    }

    pub fn spawned(&self) -> usize {
        self.fleet.spawned()
    }
}

#[async_trait]
impl Executor for ResourceBroker {
    fn label(&self) -> &'static str {
        self.fleet.label()
    }

    fn submit(&mut self, task: Task) -> TaskIndex {
        self.fleet.submit(task)
    }

    async fn next_completed(&mut self) -> Option<ResultEnvelope> {
        self.fleet.next_completed().await
    }

    async fn shutdown(&mut self) {
        self.fleet.shutdown().await
    }
}
