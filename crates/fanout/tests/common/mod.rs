#![allow(dead_code)]

use std::{thread, time::Duration};

use fanout::{FnRegistry, WorkerCommand};
use serde_json::{Value, json};

/// Environment variable the test initializer binds a worker to.
pub const DEVICE_ENV: &str = "FANOUT_TEST_DEVICE";

/// Duration unit of the broker workload.
pub const UNIT: Duration = Duration::from_millis(300);

/// Relative durations of the broker workload, by task id.
pub const WORKLOAD: [u64; 5] = [5, 1, 1, 1, 1];

pub fn registry() -> FnRegistry {
    let mut reg = FnRegistry::new();
    reg.register("square", |(x,): (i64,)| Ok::<_, String>(x * x));
    reg.register("fail_at_two", |(x,): (i64,)| {
        if x == 2 {
            Err("ValueError: x".to_string())
        } else {
            Ok(x)
        }
    });
    reg.register("crash_at", |(x, at): (i64, i64)| {
        if x == at {
            kill_self();
        }
        Ok::<_, String>(x)
    });
    reg.register("explode", |(x,): (i64,)| -> Result<i64, String> {
        panic!("exploded on {x}")
    });
    reg.register("nap", |(ms,): (u64,)| {
        thread::sleep(Duration::from_millis(ms));
        Ok::<_, String>(std::process::id())
    });
    reg.register("chatty", |(x,): (i64,)| {
        println!("{}: working on {x}", std::process::id());
        println!("@@fanout not really a frame");
        Ok::<_, String>(x + 1)
    });
    reg.register("dotty", |(x,): (i64,)| {
        use std::io::Write;
        print!(".");
        let _ = std::io::stdout().flush();
        Ok::<_, String>(x + 1)
    });
    reg.register("work", |(task,): (usize,)| {
        thread::sleep(UNIT * WORKLOAD[task % WORKLOAD.len()] as u32);
        Ok::<_, String>(json!({
            "task": task,
            "device": std::env::var(DEVICE_ENV).ok(),
            "context": fanout::context_id(),
        }))
    });
    reg.register_init("bind", |(device,): (u32,)| {
        // Worker processes are single-threaded while initializing.
        unsafe { std::env::set_var(DEVICE_ENV, device.to_string()) };
        Ok::<_, String>(())
    });
    reg.register_init("bind_even", |(device,): (u32,)| {
        if device % 2 == 1 {
            return Err(format!("device {device} is offline"));
        }
        unsafe { std::env::set_var(DEVICE_ENV, device.to_string()) };
        Ok(())
    });
    reg
}

/// Hands the process over to the worker loop when launched as a worker.
pub fn serve() {
    fanout::serve_if_worker(&registry());
}

/// Re-executes this test binary, filtered down to its `worker_entry` test.
pub fn worker() -> WorkerCommand {
    WorkerCommand::current_exe()
        .expect("test binary path")
        .args([
            "worker_entry",
            "--exact",
            "--nocapture",
            "--test-threads=1",
            "--quiet",
        ])
}

pub fn ints(values: impl IntoIterator<Item = i64>) -> Vec<Value> {
    values.into_iter().map(|v| json!(v)).collect()
}

fn kill_self() {
    unsafe {
        libc::kill(libc::getpid(), libc::SIGKILL);
    }
}
