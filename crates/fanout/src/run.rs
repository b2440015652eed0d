use std::sync::Arc;

use fanout_core::{
    CoreError, Executor, FnRegistry, InlineExecutor, ThreadPoolExecutor, dispatch,
};
use fanout_exec::{
    BrokerConfig, Fleet, PoolConfig, RUN_ID_ENV, ResourceBroker, SupervisedPool, WorkerCommand,
};
use fanout_model::{ConfigError, Outcome, ResourceContext, StrategyKind, Task};
use fanout_observe::make_reporter;
use serde_json::Value;
use tracing::{Span, field, info, instrument};
use uuid::Uuid;

use crate::{BrokerOptions, RunOptions};

/// Runs `func` once per entry of `args_list` and returns the outcomes in input order.
///
/// Every entry is a positional argument list; a lone value is treated as a one-element
/// list. Task failures and worker crashes are returned as [`Outcome::Failure`] in their
/// slot; with `raise_on_error` the first failure observed is returned as
/// [`CoreError::TaskFailed`] after all tasks are accounted for.
///
/// Configuration is checked before any worker starts. An empty `args_list` returns an
/// empty result without starting workers.
#[instrument(
    name = "run_with_concurrent",
    skip_all,
    fields(function = %func, strategy = %opts.strategy, run_id = field::Empty)
)]
pub async fn run_with_concurrent(
    registry: &FnRegistry,
    func: &str,
    args_list: Vec<Value>,
    opts: &RunOptions,
) -> Result<Vec<Outcome>, CoreError> {
    if opts.concurrency == 0 {
        return Err(ConfigError::ZeroConcurrency.into());
    }
    registry.ensure_function(func)?;
    if args_list.is_empty() {
        return Ok(Vec::new());
    }

    let run_id = new_run_id();
    let tasks = Task::batch(func, args_list);
    let mut executor = build_executor(registry, opts, &run_id)?;
    let mut progress = make_reporter(&opts.reporter, tasks.len(), func, opts.strategy.as_str());

    info!(
        target: "fanout.run",
        total = tasks.len(),
        concurrency = opts.concurrency,
        "run started"
    );
    let outcomes = dispatch(
        executor.as_mut(),
        tasks,
        progress.as_mut(),
        opts.raise_on_error,
    )
    .await?;
    info!(target: "fanout.run", failed = failed(&outcomes), "run finished");
    Ok(outcomes)
}

/// Runs `func` on long-lived workers, one per entry of `init_args`.
///
/// Each worker calls `init_func` once with its entry, then pulls tasks from a queue shared
/// by all workers until the queue is empty. A fast worker therefore takes over work a slow
/// one would otherwise have had to wait for.
#[instrument(
    name = "run_with_resource_broker",
    skip_all,
    fields(init = %init_func, function = %func, run_id = field::Empty)
)]
pub async fn run_with_resource_broker(
    registry: &FnRegistry,
    init_func: &str,
    init_args: Vec<Value>,
    func: &str,
    args_list: Vec<Value>,
    opts: &BrokerOptions,
) -> Result<Vec<Outcome>, CoreError> {
    registry.ensure_function(func)?;
    let contexts = ResourceContext::from_args(init_args);
    registry.validate_contexts(init_func, &contexts)?;
    if args_list.is_empty() {
        return Ok(Vec::new());
    }

    let run_id = new_run_id();
    let tasks = Task::batch(func, args_list);
    let command = worker_command(opts.worker.as_ref(), &run_id)?;
    let cfg = BrokerConfig::new(init_func, contexts, command).with_isolation(opts.isolate_tasks);
    let mut broker = ResourceBroker::new(cfg);
    let mut progress = make_reporter(&opts.reporter, tasks.len(), func, broker.label());

    info!(
        target: "fanout.run",
        total = tasks.len(),
        contexts = broker.contexts(),
        isolate = opts.isolate_tasks,
        "broker run started"
    );
    let outcomes = dispatch(&mut broker, tasks, progress.as_mut(), false).await?;
    info!(target: "fanout.run", failed = failed(&outcomes), "broker run finished");
    Ok(outcomes)
}

fn new_run_id() -> String {
    let run_id = Uuid::new_v4().to_string();
    Span::current().record("run_id", run_id.as_str());
    run_id
}

fn failed(outcomes: &[Outcome]) -> usize {
    outcomes.iter().filter(|o| !o.is_success()).count()
}

fn build_executor(
    registry: &FnRegistry,
    opts: &RunOptions,
    run_id: &str,
) -> Result<Box<dyn Executor>, CoreError> {
    let executor: Box<dyn Executor> = match opts.strategy {
        StrategyKind::Inline => Box::new(InlineExecutor::new(Arc::new(registry.clone()))),
        StrategyKind::ThreadPool => Box::new(ThreadPoolExecutor::new(
            Arc::new(registry.clone()),
            opts.concurrency,
        )),
        StrategyKind::ProcessPool => Box::new(Fleet::process_pool(
            worker_command(opts.worker.as_ref(), run_id)?,
            opts.concurrency,
        )),
        StrategyKind::SupervisedProcessPool => Box::new(SupervisedPool::new(PoolConfig::new(
            opts.concurrency,
            worker_command(opts.worker.as_ref(), run_id)?,
        ))),
    };
    Ok(executor)
}

fn worker_command(configured: Option<&WorkerCommand>, run_id: &str) -> Result<WorkerCommand, CoreError> {
    let command = match configured {
        Some(command) => command.clone(),
        None => WorkerCommand::current_exe().map_err(|e| CoreError::Executor(e.to_string()))?,
    };
    Ok(command.env(RUN_ID_ENV, run_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_observe::ReporterConfig;
    use serde_json::json;

    fn registry() -> FnRegistry {
        let mut reg = FnRegistry::new();
        reg.register("square", |(x,): (i64,)| Ok::<_, String>(x * x));
        reg.register_init("bind", |(_device,): (u32,)| Ok::<_, String>(()));
        reg
    }

    fn opts(strategy: StrategyKind) -> RunOptions {
        RunOptions::new(strategy, 2).with_reporter(ReporterConfig::silent())
    }

    #[tokio::test]
    async fn unknown_function_fails_before_work() {
        let err = run_with_concurrent(&registry(), "cube", vec![json!(1)], &opts(StrategyKind::Inline))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::UnknownFunction(name)) if name == "cube"));
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let err = run_with_concurrent(
            &registry(),
            "square",
            Vec::new(),
            &RunOptions::new(StrategyKind::ThreadPool, 0),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::ZeroConcurrency)));
    }

    #[tokio::test]
    async fn thread_pool_keeps_input_order() {
        let args = (0..20).map(|x| json!(x)).collect();
        let out = run_with_concurrent(&registry(), "square", args, &opts(StrategyKind::ThreadPool))
            .await
            .unwrap();
        let values: Vec<i64> = out
            .iter()
            .map(|o| o.value().and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(values, (0..20).map(|x| x * x).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn malformed_init_args_fail_before_work() {
        let err = run_with_resource_broker(
            &registry(),
            "bind",
            vec![json!(0), json!("gpu-one")],
            "square",
            vec![json!(1)],
            &BrokerOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Config(ConfigError::InvalidInitArgs { context_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn broker_needs_a_context() {
        let err = run_with_resource_broker(
            &registry(),
            "bind",
            Vec::new(),
            "square",
            vec![json!(1)],
            &BrokerOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::NoResourceContexts)));
    }

    #[tokio::test]
    async fn empty_broker_run_starts_nothing() {
        let opts = BrokerOptions::default().with_worker(WorkerCommand::new("/definitely/not/a/worker"));
        let out = run_with_resource_broker(&registry(), "bind", vec![json!(0)], "square", Vec::new(), &opts)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn run_id_reaches_worker_env() {
        let cmd = worker_command(Some(&WorkerCommand::new("/bin/worker")), "abc").unwrap();
        assert_eq!(cmd.env, vec![(RUN_ID_ENV.to_string(), "abc".to_string())]);
    }
}
