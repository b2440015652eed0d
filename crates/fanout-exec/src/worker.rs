//! Worker side of the process protocol.
//!
//! A worker is the host program re-executed with [`WORKER_MODE_ENV`] set. Call
//! [`serve_if_worker`] at the very start of `main`, before building an async runtime:
//!
//! ```no_run
//! use fanout_core::FnRegistry;
//!
//! fn registry() -> FnRegistry {
//!     let mut reg = FnRegistry::new();
//!     reg.register("double", |(x,): (i64,)| Ok::<_, String>(x * 2));
//!     reg
//! }
//!
//! fn main() {
//!     fanout_exec::serve_if_worker(&registry());
//!     // parent program continues here
//! }
//! ```

use std::{
    io::{self, BufRead, Write},
    time::Instant,
};

use fanout_core::{Executor, FnRegistry};
use fanout_model::{FailureKind, ResultEnvelope, Task, TaskFailure};
use fanout_observe::{LOG_ENV, LoggerConfig, logger_init};
use tracing::{debug, error, info_span, warn};

use crate::{
    CONTEXT_ID_ENV, ExecError, PoolConfig, RUN_ID_ENV, SupervisedPool, WorkerCommand, WorkerMode,
    proto::{self, FromWorker, ToWorker},
};

const EXIT_OK: i32 = 0;
const EXIT_PROTOCOL: i32 = 2;
const EXIT_INIT_FAILED: i32 = 3;

/// Turns this process into a worker when it was launched as one.
///
/// Returns immediately in a regular process. In a worker process it serves the parent
/// over stdin/stdout and exits; it never returns.
pub fn serve_if_worker(registry: &FnRegistry) {
    let Some(mode) = WorkerMode::from_env() else {
        return;
    };
    if std::env::var_os(LOG_ENV).is_some() {
        let _ = LoggerConfig::from_env().and_then(|cfg| logger_init(&cfg));
    }
    let span = info_span!(
        target: "fanout.exec.worker",
        "worker",
        mode = mode.as_str(),
        pid = std::process::id(),
        run_id = std::env::var(RUN_ID_ENV).ok().as_deref(),
        context = context_id(),
    );
    let code = span.in_scope(|| match mode {
        WorkerMode::Task => serve_task(registry),
        WorkerMode::Server => serve_server(registry),
    });
    std::process::exit(code);
}

/// Resource context id of the current broker worker, if any.
pub fn context_id() -> Option<usize> {
    std::env::var(CONTEXT_ID_ENV).ok()?.parse().ok()
}

fn serve_task(registry: &FnRegistry) -> i32 {
    let stdin = io::stdin();
    let mut frames = FrameReader::new(stdin.lock());

    let task = match frames.next() {
        Some(Ok(ToWorker::Run { task })) => task,
        Some(Ok(other)) => {
            error!(target: "fanout.exec.worker", frame = ?other, "expected a task frame");
            return EXIT_PROTOCOL;
        }
        Some(Err(e)) => {
            error!(target: "fanout.exec.worker", error = %e, "cannot read task frame");
            return EXIT_PROTOCOL;
        }
        None => return EXIT_PROTOCOL,
    };

    let envelope = registry.invoke(&task);
    match send(&FromWorker::Done { envelope }) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!(target: "fanout.exec.worker", error = %e, "cannot report result");
            EXIT_PROTOCOL
        }
    }
}

fn serve_server(registry: &FnRegistry) -> i32 {
    let stdin = io::stdin();
    let mut frames = FrameReader::new(stdin.lock());

    let (isolate, init) = match frames.next() {
        Some(Ok(ToWorker::Configure { isolate, init })) => (isolate, init),
        other => {
            error!(target: "fanout.exec.worker", frame = ?other, "expected a configure frame");
            return EXIT_PROTOCOL;
        }
    };

    if let Some(init) = init {
        if let Err(failure) = registry.initialize(&init.function, &init.context) {
            error!(
                target: "fanout.exec.worker",
                context = init.context.context_id,
                error = %failure,
                "resource initializer failed"
            );
            let _ = send(&FromWorker::InitFailed { failure });
            return EXIT_INIT_FAILED;
        }
        debug!(target: "fanout.exec.worker", context = init.context.context_id, "resource bound");
    }

    let isolated = if isolate {
        match Isolated::new() {
            Ok(runner) => Some(runner),
            Err(e) => {
                error!(target: "fanout.exec.worker", error = %e, "cannot prepare isolated task runner");
                return EXIT_PROTOCOL;
            }
        }
    } else {
        None
    };

    loop {
        if send(&FromWorker::Ready).is_err() {
            return EXIT_PROTOCOL;
        }
        match frames.next() {
            Some(Ok(ToWorker::Run { task })) => {
                let envelope = match &isolated {
                    Some(runner) => runner.run(task),
                    None => registry.invoke(&task),
                };
                if send(&FromWorker::Done { envelope }).is_err() {
                    return EXIT_PROTOCOL;
                }
            }
            Some(Ok(ToWorker::Drained)) | None => return EXIT_OK,
            Some(Ok(other)) => {
                warn!(target: "fanout.exec.worker", frame = ?other, "unexpected frame");
                return EXIT_PROTOCOL;
            }
            Some(Err(e)) => {
                error!(target: "fanout.exec.worker", error = %e, "cannot read frame");
                return EXIT_PROTOCOL;
            }
        }
    }
}

/// Runs each task in a fresh single-slot supervised pool, so a crashing task cannot take
/// the long-lived worker down with it.
struct Isolated {
    runtime: tokio::runtime::Runtime,
    command: WorkerCommand,
}

impl Isolated {
    fn new() -> Result<Self, ExecError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            command: WorkerCommand::from_current_process()?,
        })
    }

    fn run(&self, task: Task) -> ResultEnvelope {
        let index = task.index;
        let started = Instant::now();
        let reported = self.runtime.block_on(async {
            let mut pool = SupervisedPool::new(PoolConfig::new(1, self.command.clone()));
            pool.submit(task);
            let envelope = pool.next_completed().await;
            pool.shutdown().await;
            envelope
        });
        match reported {
            Some(mut envelope) => {
                envelope.elapsed = started.elapsed();
                envelope
            }
            None => ResultEnvelope::failed(
                index,
                started.elapsed(),
                TaskFailure::new(FailureKind::Abandoned, "isolated run produced no result"),
            ),
        }
    }
}

struct FrameReader<R> {
    lines: io::Lines<R>,
}

impl<R: BufRead> FrameReader<R> {
    fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
        }
    }
}

impl<R: BufRead> Iterator for FrameReader<R> {
    type Item = Result<ToWorker, ExecError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            if let Some(frame) = proto::decode(&line) {
                return Some(frame);
            }
        }
    }
}

/// Writes one frame straight to the process stdout.
///
/// Goes through `io::stdout()` rather than `print!`, so test-harness output capture does
/// not swallow frames.
fn send(frame: &FromWorker) -> Result<(), ExecError> {
    let line = proto::encode(frame)?;
    let mut out = io::stdout().lock();
    out.write_all(line.as_bytes())?;
    out.flush()?;
    Ok(())
}
