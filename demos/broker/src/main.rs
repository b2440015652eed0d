use std::{thread, time::Duration};

use anyhow::Context;
use serde_json::{Value, json};
use tracing::info;

use fanout::{
    BrokerOptions, FnRegistry, LoggerConfig, Outcome, ReporterConfig, RunOptions, StrategyKind,
    logger_init, run_with_concurrent, run_with_resource_broker,
};

const DEVICE_ENV: &str = "DEMO_VISIBLE_DEVICES";
const DEVICES: u32 = 3;

fn registry() -> FnRegistry {
    let mut reg = FnRegistry::new();
    reg.register_init("bind_device", |(device,): (u32,)| {
        // Runs before the worker starts any thread.
        unsafe { std::env::set_var(DEVICE_ENV, device.to_string()) };
        Ok::<_, String>(())
    });
    reg.register("work", |(task, device): (u64, Option<u32>)| {
        let device = match device {
            Some(device) => device.to_string(),
            None => std::env::var(DEVICE_ENV).unwrap_or_else(|_| "-".into()),
        };
        println!("{}: I am working on {device} for {task}", std::process::id());
        thread::sleep(Duration::from_millis(100 * (task % 3 + 1)));
        Ok::<_, String>(task * 2)
    });
    reg
}

fn values(out: &[Outcome]) -> Vec<Value> {
    out.iter()
        .map(|o| o.value().cloned().unwrap_or(Value::Null))
        .collect()
}

fn main() -> anyhow::Result<()> {
    fanout::serve_if_worker(&registry());

    logger_init(&LoggerConfig::from_env()?).context("logger")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("runtime")?;
    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let registry = registry();
    let pinned: Vec<Value> = (0..5u64)
        .map(|task| json!([task, task as u32 % DEVICES]))
        .collect();

    for strategy in [
        StrategyKind::ThreadPool,
        StrategyKind::ProcessPool,
        StrategyKind::SupervisedProcessPool,
    ] {
        let opts = RunOptions::new(strategy, DEVICES as usize);
        let out = run_with_concurrent(&registry, "work", pinned.clone(), &opts).await?;
        info!(%strategy, results = ?values(&out), "pinned run finished");
        println!("----");
    }

    let devices = (0..DEVICES).map(|d| json!(d)).collect();
    let tasks = (0..5u64).map(|task| json!([task, null])).collect();
    let opts = BrokerOptions::default().with_reporter(ReporterConfig::print().with_interval(1.0));
    let out = run_with_resource_broker(&registry, "bind_device", devices, "work", tasks, &opts).await?;
    println!("{:?}", values(&out));
    Ok(())
}
