//! POSIX rlimits for worker processes.
//!
//! Limits are installed in a `pre_exec` hook, i.e. in the child after `fork()` and right
//! before `execve()`, so a worker never runs unrestricted. On non-Unix targets a non-empty
//! configuration is logged and ignored.
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;

/// Declarative rlimits applied to every worker process spawned from a command.
///
/// `None` leaves the inherited limit unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`; growing a file past it delivers `SIGXFSZ`, which shows up as a crash.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_AS`; bounds the virtual memory of one worker.
    pub max_address_space_bytes: Option<u64>,
    /// `RLIMIT_CORE = 0`, so crashing workers do not leave core files behind.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && self.max_address_space_bytes.is_none()
            && !self.disable_core_dumps
    }

    pub fn without_core_dumps(mut self) -> Self {
        self.disable_core_dumps = true;
        self
    }
}

/// Installs `config` on `cmd`; a no-op for an empty configuration.
pub(crate) fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach(cmd, *config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(
            target: "fanout.exec.limits",
            ?config,
            "worker rlimits requested on a non-Unix OS; limits will be ignored"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    fn requested(config: &RlimitConfig) -> Vec<(Resource, u64)> {
        let mut out = Vec::with_capacity(4);
        if let Some(n) = config.max_open_files {
            out.push((libc::RLIMIT_NOFILE, n));
        }
        if let Some(n) = config.max_file_size_bytes {
            out.push((libc::RLIMIT_FSIZE, n));
        }
        if let Some(n) = config.max_address_space_bytes {
            out.push((libc::RLIMIT_AS, n));
        }
        if config.disable_core_dumps {
            out.push((libc::RLIMIT_CORE, 0));
        }
        out
    }

    pub(super) fn attach(cmd: &mut Command, config: RlimitConfig) {
        let limits = requested(&config);
        // SAFETY: the hook only calls setrlimit, which is async-signal-safe, and does not allocate.
        unsafe {
            cmd.pre_exec(move || {
                for &(resource, value) in &limits {
                    apply(resource, value)?;
                }
                Ok(())
            });
        }
    }

    fn apply(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

}
