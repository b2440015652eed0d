use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use fanout_model::{FailureKind, ResultEnvelope, Task, TaskFailure, TaskIndex};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::warn;

use crate::{Executor, FnRegistry};

/// Runs tasks on blocking OS threads, at most `max_workers` at a time.
pub struct ThreadPoolExecutor {
    registry: Arc<FnRegistry>,
    permits: Arc<Semaphore>,
    running: JoinSet<ResultEnvelope>,
}

impl ThreadPoolExecutor {
    pub fn new(registry: Arc<FnRegistry>, max_workers: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            running: JoinSet::new(),
        }
    }
}

#[async_trait]
impl Executor for ThreadPoolExecutor {
    fn label(&self) -> &'static str {
        "thread-pool"
    }

    fn submit(&mut self, task: Task) -> TaskIndex {
        let index = task.index;
        let registry = Arc::clone(&self.registry);
        let permits = Arc::clone(&self.permits);

        self.running.spawn(async move {
            let started = Instant::now();
            let Ok(_permit) = permits.acquire_owned().await else {
                return ResultEnvelope::failed(
                    index,
                    started.elapsed(),
                    TaskFailure::new(FailureKind::Abandoned, "thread pool closed"),
                );
            };
            match tokio::task::spawn_blocking(move || registry.invoke(&task)).await {
                Ok(env) => env,
                Err(e) => ResultEnvelope::failed(
                    index,
                    started.elapsed(),
                    TaskFailure::new(FailureKind::Panicked, e.to_string()),
                ),
            }
        });
        index
    }

    async fn next_completed(&mut self) -> Option<ResultEnvelope> {
        while let Some(joined) = self.running.join_next().await {
            match joined {
                Ok(env) => return Some(env),
                Err(e) => warn!(target: "fanout.core.thread_pool", error = %e, "task join failed"),
            }
        }
        None
    }

    async fn shutdown(&mut self) {
        self.permits.close();
        self.running.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrency_is_bounded() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut reg = FnRegistry::new();
        {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            reg.register("hold", move |(ms,): (u64,)| {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(ms));
                live.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(ms)
            });
        }

        let mut exec = ThreadPoolExecutor::new(Arc::new(reg), 2);
        for task in Task::batch("hold", (0..6).map(|_| json!(30))) {
            exec.submit(task);
        }

        let mut done = 0;
        while let Some(env) = exec.next_completed().await {
            assert!(env.outcome.is_success());
            done += 1;
        }
        exec.shutdown().await;

        assert_eq!(done, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
