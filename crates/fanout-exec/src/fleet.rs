//! Long-lived worker processes pulling from one shared task queue.
//!
//! Every seat is one worker process. The worker announces itself with a `ready` frame,
//! the seat's link pops the next task from the shared queue and hands it over, and so on
//! until the queue is empty, at which point the worker is told to exit. Tasks are never
//! assigned ahead of time, so a slow worker never strands work another worker could do.
//!
//! The queue is filled before the first worker starts (workers launch on the first
//! [`next_completed`](Executor::next_completed)), so an empty queue really means the run
//! is drained.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fanout_core::Executor;
use fanout_model::{
    ExitInfo, FailureKind, ResourceContext, ResultEnvelope, Task, TaskFailure, TaskIndex,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Child,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
    CONTEXT_ID_ENV, WorkerCommand, WorkerMode,
    proto::{FromWorker, InitRequest, ToWorker},
    util::{read_frame, wait_or_terminate, write_frame},
};

type SharedQueue = Arc<Mutex<VecDeque<Task>>>;

#[derive(Debug, Clone, Default)]
struct Seat {
    env: Vec<(&'static str, String)>,
    init: Option<InitRequest>,
}

#[derive(Debug)]
enum SeatEvent {
    Done {
        seat: usize,
        envelope: ResultEnvelope,
    },
    InitFailed {
        seat: usize,
        failure: TaskFailure,
    },
    Exited {
        seat: usize,
        exit: ExitInfo,
        in_flight: Option<(TaskIndex, Instant)>,
    },
}

pub struct Fleet {
    label: &'static str,
    command: WorkerCommand,
    seats: Vec<Seat>,
    /// Run every task in an isolated one-shot process inside the worker.
    isolate: bool,
    /// Replace a worker that died mid-task while work remains.
    respawn: bool,

    queue: SharedQueue,
    ready: VecDeque<ResultEnvelope>,
    events_tx: mpsc::UnboundedSender<SeatEvent>,
    events_rx: mpsc::UnboundedReceiver<SeatEvent>,
    cancels: Vec<Option<CancellationToken>>,
    last_fault: Option<String>,

    launched: bool,
    /// Submitted indices not yet returned to the caller.
    outstanding: BTreeSet<TaskIndex>,
    live: usize,
    spawned: usize,
}

impl Fleet {
    /// Plain process pool: `workers` interchangeable workers, replaced when they crash.
    pub fn process_pool(command: WorkerCommand, workers: usize) -> Self {
        let seats = vec![Seat::default(); workers.max(1)];
        Self::with_seats("process-pool", command, seats, false, true)
    }

    /// One worker per resource context, each initialized once before it pulls tasks.
    ///
    /// Workers are not replaced: a context is bound to exactly one worker for the run.
    pub fn broker(
        command: WorkerCommand,
        init_function: &str,
        contexts: &[ResourceContext],
        isolate: bool,
    ) -> Self {
        let seats = contexts
            .iter()
            .map(|ctx| Seat {
                env: vec![(CONTEXT_ID_ENV, ctx.context_id.to_string())],
                init: Some(InitRequest {
                    function: init_function.to_string(),
                    context: ctx.clone(),
                }),
            })
            .collect();
        Self::with_seats("resource-broker", command, seats, isolate, false)
    }

    fn with_seats(
        label: &'static str,
        command: WorkerCommand,
        seats: Vec<Seat>,
        isolate: bool,
        respawn: bool,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancels = vec![None; seats.len()];
        Self {
            label,
            command,
            seats,
            isolate,
            respawn,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            ready: VecDeque::new(),
            events_tx,
            events_rx,
            cancels,
            last_fault: None,
            launched: false,
            outstanding: BTreeSet::new(),
            live: 0,
            spawned: 0,
        }
    }

    pub fn seats(&self) -> usize {
        self.seats.len()
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Worker processes started so far, replacements included.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn launch_all(&mut self) {
        self.launched = true;
        let wanted = self.seats.len().min(self.queued());
        for seat in 0..wanted {
            self.launch(seat);
        }
        debug!(target: "fanout.exec.fleet", label = self.label, workers = self.live, tasks = self.outstanding.len(), "fleet launched");
    }

    fn launch(&mut self, seat: usize) {
        let configure = ToWorker::Configure {
            isolate: self.isolate,
            init: self.seats[seat].init.clone(),
        };
        let child = match self.command.spawn(WorkerMode::Server, &self.seats[seat].env) {
            Ok(child) => child,
            Err(e) => {
                error!(target: "fanout.exec.fleet", seat, error = %e, "cannot start worker");
                self.last_fault = Some(e.to_string());
                return;
            }
        };

        self.spawned += 1;
        self.live += 1;
        let cancel = CancellationToken::new();
        self.cancels[seat] = Some(cancel.clone());
        trace!(target: "fanout.exec.fleet", seat, pid = ?child.id(), "worker started");

        tokio::spawn(link(
            seat,
            child,
            configure,
            Arc::clone(&self.queue),
            cancel,
            self.events_tx.clone(),
        ));
    }

    /// Fails every queued task once no worker is left to run it.
    fn abandon_queue(&mut self) {
        let drained: Vec<Task> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if drained.is_empty() {
            return;
        }
        let reason = match &self.last_fault {
            Some(fault) => format!("no live worker left to run the task: {fault}"),
            None => "no live worker left to run the task".to_string(),
        };
        warn!(target: "fanout.exec.fleet", label = self.label, tasks = drained.len(), %reason, "abandoning queued tasks");
        for task in drained {
            self.ready.push_back(ResultEnvelope::failed(
                task.index,
                Duration::ZERO,
                TaskFailure::new(FailureKind::Abandoned, reason.clone()),
            ));
        }
    }

    /// Fails whatever is still unaccounted once every worker is gone.
    ///
    /// A task lands here only when its worker stopped without a report the link could
    /// attribute to it.
    fn settle_outstanding(&mut self) {
        let pending: BTreeSet<TaskIndex> = self.ready.iter().map(|e| e.index).collect();
        let lost: Vec<TaskIndex> = self.outstanding.difference(&pending).copied().collect();
        if lost.is_empty() {
            return;
        }
        warn!(target: "fanout.exec.fleet", label = self.label, tasks = lost.len(), "tasks left without a report");
        for index in lost {
            self.ready.push_back(ResultEnvelope::failed(
                index,
                Duration::ZERO,
                TaskFailure::new(FailureKind::Unreported, "no worker reported the task"),
            ));
        }
    }

    fn take(&mut self, envelope: ResultEnvelope) -> ResultEnvelope {
        self.outstanding.remove(&envelope.index);
        envelope
    }

    fn on_exit(&mut self, seat: usize, exit: ExitInfo, in_flight: Option<(TaskIndex, Instant)>) {
        self.live = self.live.saturating_sub(1);
        self.cancels[seat] = None;

        let Some((index, started)) = in_flight else {
            if exit.is_clean() {
                trace!(target: "fanout.exec.fleet", seat, "worker finished");
            } else {
                warn!(target: "fanout.exec.fleet", seat, %exit, "idle worker exited abnormally");
                self.last_fault.get_or_insert_with(|| format!("worker {exit}"));
            }
            return;
        };

        warn!(target: "fanout.exec.fleet", seat, index, %exit, "worker crashed mid-task");
        self.ready.push_back(ResultEnvelope::failed(
            index,
            started.elapsed(),
            TaskFailure::crashed(exit),
        ));
        if self.respawn && self.queued() > 0 {
            debug!(target: "fanout.exec.fleet", seat, "replacing crashed worker");
            self.launch(seat);
        }
    }
}

#[async_trait]
impl Executor for Fleet {
    fn label(&self) -> &'static str {
        self.label
    }

    fn submit(&mut self, task: Task) -> TaskIndex {
        let index = task.index;
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(task);
        self.outstanding.insert(index);
        index
    }

    async fn next_completed(&mut self) -> Option<ResultEnvelope> {
        if !self.launched {
            self.launch_all();
        }
        loop {
            if let Some(envelope) = self.ready.pop_front() {
                return Some(self.take(envelope));
            }
            if self.outstanding.is_empty() {
                return None;
            }
            if self.live == 0 {
                self.abandon_queue();
                self.settle_outstanding();
                if self.ready.is_empty() {
                    return None;
                }
                continue;
            }

            match self.events_rx.recv().await? {
                SeatEvent::Done { seat, envelope } => {
                    trace!(target: "fanout.exec.fleet", seat, index = envelope.index, "task reported");
                    return Some(self.take(envelope));
                }
                SeatEvent::InitFailed { seat, failure } => {
                    error!(target: "fanout.exec.fleet", seat, error = %failure, "worker initialization failed");
                    self.last_fault = Some(failure.to_string());
                }
                SeatEvent::Exited {
                    seat,
                    exit,
                    in_flight,
                } => self.on_exit(seat, exit, in_flight),
            }
        }
    }

    async fn shutdown(&mut self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for cancel in self.cancels.iter().flatten() {
            cancel.cancel();
        }
        while self.live > 0 {
            match self.events_rx.recv().await {
                Some(SeatEvent::Exited { seat, .. }) => {
                    self.live -= 1;
                    self.cancels[seat] = None;
                }
                Some(_) => {}
                None => break,
            }
        }
        debug!(target: "fanout.exec.fleet", label = self.label, spawned = self.spawned, "fleet shut down");
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        for cancel in self.cancels.iter().flatten() {
            cancel.cancel();
        }
    }
}

/// Serves one worker: configures it, hands out tasks on demand, reaps it.
async fn link(
    seat: usize,
    mut child: Child,
    configure: ToWorker,
    queue: SharedQueue,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SeatEvent>,
) {
    let mut in_flight: Option<(TaskIndex, Instant)> = None;

    if let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) {
        let mut lines = BufReader::new(stdout).lines();
        if let Err(e) = write_frame(&mut stdin, &configure).await {
            debug!(target: "fanout.exec.fleet", seat, error = %e, "cannot configure worker");
        } else {
            loop {
                let frame = tokio::select! {
                    frame = read_frame(&mut lines) => frame,
                    _ = cancel.cancelled() => break,
                };
                match frame {
                    Some(Ok(FromWorker::Ready)) => {
                        let next = queue
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .pop_front();
                        if let Some((index, started)) = in_flight.take() {
                            warn!(target: "fanout.exec.fleet", seat, index, "worker asked for work without reporting its task");
                            let _ = events.send(SeatEvent::Done {
                                seat,
                                envelope: ResultEnvelope::failed(
                                    index,
                                    started.elapsed(),
                                    TaskFailure::new(
                                        FailureKind::Unreported,
                                        "worker asked for more work without reporting the task",
                                    ),
                                ),
                            });
                        }
                        let Some(task) = next else {
                            let _ = write_frame(&mut stdin, &ToWorker::Drained).await;
                            break;
                        };
                        in_flight = Some((task.index, Instant::now()));
                        trace!(target: "fanout.exec.fleet", seat, index = task.index, "task handed out");
                        if let Err(e) = write_frame(&mut stdin, &ToWorker::Run { task }).await {
                            debug!(target: "fanout.exec.fleet", seat, error = %e, "cannot hand task to worker");
                            break;
                        }
                    }
                    Some(Ok(FromWorker::Done { envelope })) => {
                        if in_flight.map(|(index, _)| index) == Some(envelope.index) {
                            in_flight = None;
                            let _ = events.send(SeatEvent::Done { seat, envelope });
                        } else {
                            warn!(target: "fanout.exec.fleet", seat, index = envelope.index, "report for a task this worker does not hold");
                        }
                    }
                    Some(Ok(FromWorker::InitFailed { failure })) => {
                        let _ = events.send(SeatEvent::InitFailed { seat, failure });
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(target: "fanout.exec.fleet", seat, error = %e, "unreadable frame");
                    }
                    None => break,
                }
            }
        }
    }

    let exit = wait_or_terminate(&mut child, &cancel).await;
    let _ = events.send(SeatEvent::Exited {
        seat,
        exit,
        in_flight,
    });
}
