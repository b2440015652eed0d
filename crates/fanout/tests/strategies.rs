mod common;

use common::{ints, registry, worker};
use fanout::{
    ConfigError, CoreError, Executor, FailureKind, Outcome, PoolConfig, ReporterConfig,
    RunOptions, StrategyKind, SupervisedPool, Task, WorkerCommand, run_with_concurrent,
};
use serde_json::{Value, json};

#[test]
fn worker_entry() {
    common::serve();
}

const ALL: [StrategyKind; 4] = [
    StrategyKind::Inline,
    StrategyKind::ThreadPool,
    StrategyKind::ProcessPool,
    StrategyKind::SupervisedProcessPool,
];

fn opts(strategy: StrategyKind, concurrency: usize) -> RunOptions {
    RunOptions::new(strategy, concurrency)
        .with_reporter(ReporterConfig::silent())
        .with_worker(worker())
}

fn values(out: &[Outcome]) -> Vec<Option<i64>> {
    out.iter()
        .map(|o| o.value().and_then(Value::as_i64))
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn every_strategy_fills_every_slot_in_order() {
    for strategy in ALL {
        let out = run_with_concurrent(&registry(), "square", ints(0..12), &opts(strategy, 3))
            .await
            .unwrap();
        let expected: Vec<Option<i64>> = (0..12).map(|x| Some(x * x)).collect();
        assert_eq!(values(&out), expected, "strategy {strategy}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_input_starts_no_worker() {
    let missing = WorkerCommand::new("/definitely/not/a/worker");
    for strategy in ALL {
        let opts = opts(strategy, 2).with_worker(missing.clone());
        let out = run_with_concurrent(&registry(), "square", Vec::new(), &opts)
            .await
            .unwrap();
        assert!(out.is_empty(), "strategy {strategy}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_task_does_not_affect_siblings() {
    for strategy in ALL {
        let out = run_with_concurrent(&registry(), "fail_at_two", ints(0..4), &opts(strategy, 2))
            .await
            .unwrap();
        assert_eq!(values(&out), vec![Some(0), Some(1), None, Some(3)], "strategy {strategy}");

        let failure = out[2].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Raised);
        assert_eq!(failure.message, "ValueError: x");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn raise_on_error_reports_the_failure_after_the_run() {
    let opts = opts(StrategyKind::SupervisedProcessPool, 2).with_raise_on_error(true);
    let err = run_with_concurrent(&registry(), "fail_at_two", ints(0..4), &opts)
        .await
        .unwrap_err();
    match err {
        CoreError::TaskFailed { index, failure } => {
            assert_eq!(index, 2);
            assert_eq!(failure.message, "ValueError: x");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn killed_worker_fails_only_its_task() {
    for strategy in [StrategyKind::SupervisedProcessPool, StrategyKind::ProcessPool] {
        let args = vec![json!([0, 1]), json!([1, 1]), json!([2, 1])];
        let out = run_with_concurrent(&registry(), "crash_at", args, &opts(strategy, 1))
            .await
            .unwrap();
        assert_eq!(values(&out), vec![Some(0), None, Some(2)], "strategy {strategy}");

        let failure = out[1].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::WorkerCrashed);
        assert_eq!(failure.exit.and_then(|e| e.signal), Some(libc::SIGKILL));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panics_are_captured_in_the_worker() {
    for strategy in ALL {
        let out = run_with_concurrent(&registry(), "explode", ints([7]), &opts(strategy, 1))
            .await
            .unwrap();
        let failure = out[0].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Panicked, "strategy {strategy}");
        assert!(failure.message.contains("exploded on 7"), "{}", failure.message);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_stdout_does_not_break_the_protocol() {
    for strategy in [StrategyKind::ProcessPool, StrategyKind::SupervisedProcessPool] {
        let out = run_with_concurrent(&registry(), "chatty", ints(0..3), &opts(strategy, 2))
            .await
            .unwrap();
        assert_eq!(values(&out), vec![Some(1), Some(2), Some(3)], "strategy {strategy}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unterminated_task_output_keeps_the_result() {
    let inline = opts(StrategyKind::Inline, 1);
    let inline = run_with_concurrent(&registry(), "dotty", ints(0..3), &inline)
        .await
        .unwrap();
    assert_eq!(values(&inline), vec![Some(1), Some(2), Some(3)]);

    for strategy in [StrategyKind::ProcessPool, StrategyKind::SupervisedProcessPool] {
        let out = run_with_concurrent(&registry(), "dotty", ints(0..3), &opts(strategy, 1))
            .await
            .unwrap();
        assert_eq!(values(&out), values(&inline), "strategy {strategy}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn inline_and_supervised_pool_agree() {
    let args = ints([3, 1, 2, 0, 5]);
    let inline = run_with_concurrent(
        &registry(),
        "fail_at_two",
        args.clone(),
        &opts(StrategyKind::Inline, 1),
    )
    .await
    .unwrap();
    let supervised = run_with_concurrent(
        &registry(),
        "fail_at_two",
        args,
        &opts(StrategyKind::SupervisedProcessPool, 1),
    )
    .await
    .unwrap();
    assert_eq!(inline, supervised);
}

#[tokio::test(flavor = "multi_thread")]
async fn supervised_pool_never_exceeds_max_workers() {
    let mut pool = SupervisedPool::new(PoolConfig::new(2, worker()));
    for i in 0..6 {
        pool.submit(Task::new(i, "nap", json!(100)));
    }

    let mut pids = Vec::new();
    while let Some(envelope) = pool.next_completed().await {
        pids.push(envelope.outcome.value().and_then(Value::as_u64).unwrap());
    }
    pool.shutdown().await;

    assert_eq!(pids.len(), 6);
    assert_eq!(pool.spawned(), 6);
    assert!(pool.peak_live() <= 2, "peak was {}", pool.peak_live());
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 6, "every task runs in its own process");
}

#[tokio::test]
async fn unknown_strategy_is_a_configuration_error() {
    let err = RunOptions::default().with_strategy_tag("gpu-cluster").unwrap_err();
    assert_eq!(err, ConfigError::UnknownStrategy("gpu-cluster".into()));
}

#[tokio::test]
async fn unstartable_workers_fail_every_task() {
    let opts = opts(StrategyKind::SupervisedProcessPool, 2)
        .with_worker(WorkerCommand::new("/definitely/not/a/worker"));
    let out = run_with_concurrent(&registry(), "square", ints(0..3), &opts)
        .await
        .unwrap();
    assert!(
        out.iter()
            .all(|o| o.failure().map(|f| f.kind) == Some(FailureKind::SpawnFailed))
    );
}
