//! Supervised process pool: one short-lived worker process per task.
//!
//! At most `max_workers` processes are alive at once. Every process gets a watcher task that
//! feeds it its task, reads its report and reaps it. A slot becomes free only after its
//! process has been reaped, so the live-process bound holds even while a finished worker is
//! still shutting down. A process that exits without reporting is recorded as a crash of
//! the task it was running; the pool never retries it.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use fanout_core::Executor;
use fanout_model::{ExitInfo, FailureKind, ResultEnvelope, Task, TaskFailure, TaskIndex};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Child,
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    WorkerCommand, WorkerMode,
    proto::{FromWorker, ToWorker},
    util::{read_frame, wait_or_terminate, write_frame},
};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound of simultaneously alive worker processes.
    pub max_workers: usize,
    pub command: WorkerCommand,
}

impl PoolConfig {
    pub fn new(max_workers: usize, command: WorkerCommand) -> Self {
        Self {
            max_workers: max_workers.max(1),
            command,
        }
    }
}

/// State of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Never used.
    Idle,
    /// A process is alive and working on the slot's task.
    Running,
    /// The task reported; the process is being torn down.
    Completed,
    /// The last process exited with status 0.
    ExitedClean,
    /// The last process exited abnormally or was terminated.
    ExitedCrashed,
}

impl Liveness {
    /// `true` while the slot still owns a process.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Liveness::Running | Liveness::Completed)
    }
}

#[derive(Debug)]
enum SlotEvent {
    Reported {
        slot: usize,
        envelope: ResultEnvelope,
    },
    Exited {
        slot: usize,
        exit: ExitInfo,
        reported: bool,
    },
}

#[derive(Debug)]
struct Slot {
    task: Option<TaskIndex>,
    started: Option<Instant>,
    liveness: Liveness,
    cancel: CancellationToken,
}

impl Slot {
    fn idle() -> Self {
        Self {
            task: None,
            started: None,
            liveness: Liveness::Idle,
            cancel: CancellationToken::new(),
        }
    }
}

pub struct SupervisedPool {
    cfg: PoolConfig,
    slots: Vec<Slot>,
    pending: VecDeque<Task>,
    /// Envelopes produced without a process (spawn failures, crashes).
    ready: VecDeque<ResultEnvelope>,
    events_tx: mpsc::UnboundedSender<SlotEvent>,
    events_rx: mpsc::UnboundedReceiver<SlotEvent>,
    submitted: usize,
    accounted: usize,
    live: usize,
    peak_live: usize,
    spawned: usize,
}

impl SupervisedPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let slots = (0..cfg.max_workers).map(|_| Slot::idle()).collect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            cfg,
            slots,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
            events_tx,
            events_rx,
            submitted: 0,
            accounted: 0,
            live: 0,
            peak_live: 0,
            spawned: 0,
        }
    }

    /// Processes currently alive.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Highest number of simultaneously alive processes seen so far.
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    /// Processes started so far.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    pub fn liveness(&self) -> Vec<Liveness> {
        self.slots.iter().map(|s| s.liveness).collect()
    }

    /// Promotes pending tasks into free slots, FIFO.
    fn fill(&mut self) {
        while self.live < self.cfg.max_workers {
            let Some(slot) = self.slots.iter().position(|s| !s.liveness.is_occupied()) else {
                break;
            };
            let Some(task) = self.pending.pop_front() else {
                break;
            };
            self.start(slot, task);
        }
    }

    fn start(&mut self, slot: usize, task: Task) {
        let index = task.index;
        let started = Instant::now();
        let child = match self.cfg.command.spawn(WorkerMode::Task, &[]) {
            Ok(child) => child,
            Err(e) => {
                warn!(target: "fanout.exec.pool", slot, index, error = %e, "cannot start worker");
                self.ready.push_back(ResultEnvelope::failed(
                    index,
                    started.elapsed(),
                    TaskFailure::new(FailureKind::SpawnFailed, e.to_string()),
                ));
                return;
            }
        };

        self.spawned += 1;
        self.live += 1;
        self.peak_live = self.peak_live.max(self.live);

        let cancel = CancellationToken::new();
        self.slots[slot] = Slot {
            task: Some(index),
            started: Some(started),
            liveness: Liveness::Running,
            cancel: cancel.clone(),
        };
        debug!(target: "fanout.exec.pool", slot, index, pid = ?child.id(), live = self.live, "worker started");

        tokio::spawn(watch(slot, task, child, cancel, self.events_tx.clone()));
    }

    fn on_exit(&mut self, slot: usize, exit: ExitInfo, reported: bool) {
        self.live = self.live.saturating_sub(1);
        let s = &mut self.slots[slot];
        s.liveness = if exit.is_clean() {
            Liveness::ExitedClean
        } else {
            Liveness::ExitedCrashed
        };
        let index = s.task.take();
        let elapsed = s.started.take().map(|t| t.elapsed()).unwrap_or(Duration::ZERO);

        match index {
            Some(index) if !reported => {
                warn!(target: "fanout.exec.pool", slot, index, %exit, "worker crashed");
                self.ready.push_back(ResultEnvelope::failed(
                    index,
                    elapsed,
                    TaskFailure::crashed(exit),
                ));
            }
            _ => trace!(target: "fanout.exec.pool", slot, %exit, "worker reaped"),
        }
    }
}

#[async_trait]
impl Executor for SupervisedPool {
    fn label(&self) -> &'static str {
        "supervised-process-pool"
    }

    fn submit(&mut self, task: Task) -> TaskIndex {
        let index = task.index;
        self.pending.push_back(task);
        self.submitted += 1;
        index
    }

    async fn next_completed(&mut self) -> Option<ResultEnvelope> {
        loop {
            self.fill();
            if let Some(envelope) = self.ready.pop_front() {
                self.accounted += 1;
                return Some(envelope);
            }
            if self.accounted >= self.submitted {
                return None;
            }

            // The pool keeps a sender, so the channel never closes under us.
            match self.events_rx.recv().await? {
                SlotEvent::Reported { slot, envelope } => {
                    let s = &mut self.slots[slot];
                    s.liveness = Liveness::Completed;
                    s.task = None;
                    s.cancel.cancel();
                    self.accounted += 1;
                    return Some(envelope);
                }
                SlotEvent::Exited {
                    slot,
                    exit,
                    reported,
                } => self.on_exit(slot, exit, reported),
            }
        }
    }

    async fn shutdown(&mut self) {
        self.pending.clear();
        for slot in &self.slots {
            if slot.liveness.is_occupied() {
                slot.cancel.cancel();
            }
        }
        while self.live > 0 {
            match self.events_rx.recv().await {
                Some(SlotEvent::Exited { slot, exit, .. }) => {
                    self.live -= 1;
                    self.slots[slot].liveness = if exit.is_clean() {
                        Liveness::ExitedClean
                    } else {
                        Liveness::ExitedCrashed
                    };
                }
                Some(SlotEvent::Reported { .. }) => {}
                None => break,
            }
        }
        debug!(target: "fanout.exec.pool", spawned = self.spawned, peak = self.peak_live, "pool shut down");
    }
}

impl Drop for SupervisedPool {
    fn drop(&mut self) {
        for slot in &self.slots {
            slot.cancel.cancel();
        }
    }
}

/// Feeds one task to its process, forwards the report and reaps the process.
///
/// After a report the process is left to exit until the pool cancels the slot.
async fn watch(
    slot: usize,
    task: Task,
    mut child: Child,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<SlotEvent>,
) {
    let index = task.index;
    let mut reported = false;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = write_frame(&mut stdin, &ToWorker::Run { task }).await {
            debug!(target: "fanout.exec.pool", slot, index, error = %e, "cannot hand task to worker");
        }
        // Dropping stdin closes it; the worker needs exactly one frame.
    }

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                frame = read_frame(&mut lines) => match frame {
                    Some(Ok(FromWorker::Done { envelope })) if envelope.index == index => {
                        reported = true;
                        let _ = events.send(SlotEvent::Reported { slot, envelope });
                        break;
                    }
                    Some(Ok(other)) => {
                        warn!(target: "fanout.exec.pool", slot, index, frame = ?other, "unexpected frame");
                    }
                    Some(Err(e)) => {
                        warn!(target: "fanout.exec.pool", slot, index, error = %e, "unreadable frame");
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
    }

    let exit = wait_or_terminate(&mut child, &cancel).await;
    let _ = events.send(SlotEvent::Exited {
        slot,
        exit,
        reported,
    });
}
