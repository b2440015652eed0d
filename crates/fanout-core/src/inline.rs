use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use fanout_model::{ResultEnvelope, Task, TaskIndex};

use crate::{Executor, FnRegistry};

/// Runs tasks one by one on the caller's thread, in submission order.
pub struct InlineExecutor {
    registry: Arc<FnRegistry>,
    pending: VecDeque<Task>,
}

impl InlineExecutor {
    pub fn new(registry: Arc<FnRegistry>) -> Self {
        Self {
            registry,
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Executor for InlineExecutor {
    fn label(&self) -> &'static str {
        "inline"
    }

    fn submit(&mut self, task: Task) -> TaskIndex {
        let index = task.index;
        self.pending.push_back(task);
        index
    }

    async fn next_completed(&mut self) -> Option<ResultEnvelope> {
        let task = self.pending.pop_front()?;
        Some(self.registry.invoke(&task))
    }

    async fn shutdown(&mut self) {
        self.pending.clear();
    }
}
