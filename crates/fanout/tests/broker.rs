mod common;

use std::collections::HashMap;

use common::{WORKLOAD, ints, registry, worker};
use fanout::{BrokerOptions, FailureKind, Outcome, ReporterConfig, run_with_resource_broker};
use serde_json::{Value, json};

#[test]
fn worker_entry() {
    common::serve();
}

fn opts() -> BrokerOptions {
    BrokerOptions::default()
        .with_reporter(ReporterConfig::silent())
        .with_worker(worker())
}

fn field(outcome: &Outcome, name: &str) -> Value {
    outcome.value().and_then(|v| v.get(name)).cloned().unwrap_or(Value::Null)
}

#[tokio::test(flavor = "multi_thread")]
async fn fast_context_takes_over_the_short_tasks() {
    let tasks = (0..WORKLOAD.len()).map(|t| json!(t)).collect();
    let out = run_with_resource_broker(&registry(), "bind", ints([0, 1]), "work", tasks, &opts())
        .await
        .unwrap();

    assert_eq!(out.len(), WORKLOAD.len());
    let mut per_context: HashMap<u64, usize> = HashMap::new();
    for (task, outcome) in out.iter().enumerate() {
        assert_eq!(field(outcome, "task"), json!(task));
        let context = field(outcome, "context").as_u64().unwrap();
        // The initializer's environment reaches the isolated task process.
        assert_eq!(field(outcome, "device"), json!(context.to_string()));
        *per_context.entry(context).or_default() += 1;
    }

    let slow = field(&out[0], "context").as_u64().unwrap();
    let fast_share: usize = per_context
        .iter()
        .filter(|(ctx, _)| **ctx != slow)
        .map(|(_, n)| n)
        .sum();
    assert!(fast_share > 2, "distribution was {per_context:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn tasks_run_in_the_bound_worker_without_isolation() {
    let opts = opts().with_isolation(false);
    let out = run_with_resource_broker(&registry(), "bind", ints([0, 1, 2]), "square", ints(0..9), &opts)
        .await
        .unwrap();
    let squares: Vec<_> = out.iter().map(|o| o.value().and_then(Value::as_i64)).collect();
    assert_eq!(squares, (0..9).map(|x| Some(x * x)).collect::<Vec<Option<i64>>>());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn isolated_crash_keeps_the_worker_alive() {
    let args = vec![json!([0, 1]), json!([1, 1]), json!([2, 1]), json!([3, 1])];
    let out = run_with_resource_broker(&registry(), "bind", ints([0]), "crash_at", args, &opts())
        .await
        .unwrap();

    let kinds: Vec<_> = out.iter().map(|o| o.failure().map(|f| f.kind)).collect();
    assert_eq!(kinds, vec![None, Some(FailureKind::WorkerCrashed), None, None]);
    assert_eq!(out[3].value(), Some(&json!(3)));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_initializer_leaves_work_to_the_others() {
    let out = run_with_resource_broker(&registry(), "bind_even", ints([0, 1]), "square", ints(0..6), &opts())
        .await
        .unwrap();
    assert!(out.iter().all(Outcome::is_success));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_initialized_worker_abandons_the_queue() {
    let out = run_with_resource_broker(&registry(), "bind_even", ints([1, 3]), "square", ints(0..4), &opts())
        .await
        .unwrap();

    assert_eq!(out.len(), 4);
    for outcome in &out {
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Abandoned);
        assert!(failure.message.contains("offline"), "{}", failure.message);
    }
}
