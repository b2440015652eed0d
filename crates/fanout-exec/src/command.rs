use std::{
    ffi::{OsStr, OsString},
    path::PathBuf,
    process::Stdio,
};

use tokio::process::{Child, Command};
use tracing::trace;

use crate::{ExecError, RlimitConfig, limits::attach_rlimits};

/// Selects the worker loop a re-executed process runs.
pub const WORKER_MODE_ENV: &str = "FANOUT_WORKER";
/// Resource context bound to a long-lived broker worker and to the tasks it runs.
pub const CONTEXT_ID_ENV: &str = "FANOUT_CONTEXT_ID";
/// Identifier of the run a worker belongs to, for log correlation.
pub const RUN_ID_ENV: &str = "FANOUT_RUN_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Run exactly one task read from stdin, report it, exit.
    Task,
    /// Pull tasks until the parent says the queue is drained.
    Server,
}

impl WorkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Task => "task",
            WorkerMode::Server => "server",
        }
    }

    pub fn from_env() -> Option<Self> {
        match std::env::var(WORKER_MODE_ENV).ok()?.as_str() {
            "task" => Some(WorkerMode::Task),
            "server" => Some(WorkerMode::Server),
            _ => None,
        }
    }
}

/// How worker processes are launched.
///
/// The program must call [`serve_if_worker`](crate::serve_if_worker) with the same function
/// registry as the parent.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
    pub limits: RlimitConfig,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            limits: RlimitConfig::default(),
        }
    }

    /// The running executable, without arguments.
    pub fn current_exe() -> Result<Self, ExecError> {
        let program =
            std::env::current_exe().map_err(|e| ExecError::CurrentExe(e.to_string()))?;
        Ok(Self::new(program))
    }

    /// The running executable with the arguments it was started with.
    ///
    /// A worker uses this to launch isolated task processes exactly like itself.
    pub fn from_current_process() -> Result<Self, ExecError> {
        let mut cmd = Self::current_exe()?;
        cmd.args = std::env::args_os().skip(1).collect();
        Ok(cmd)
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_limits(mut self, limits: RlimitConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Spawns one worker with piped stdin/stdout; stderr is inherited.
    pub(crate) fn spawn(
        &self,
        mode: WorkerMode,
        extra_env: &[(&str, String)],
    ) -> Result<Child, ExecError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(extra_env.iter().map(|(k, v)| (*k, v.as_str())))
            .env(WORKER_MODE_ENV, mode.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        attach_rlimits(&mut cmd, &self.limits);

        trace!(
            target: "fanout.exec.command",
            program = %self.program.display(),
            mode = mode.as_str(),
            "spawn worker"
        );
        cmd.spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", self.program.display())))
    }
}
