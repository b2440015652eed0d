use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Concurrency mechanism used for every task of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Caller's own thread, one task after another.
    Inline,
    /// Blocking OS threads bounded by the concurrency degree.
    ThreadPool,
    /// Long-lived worker processes sharing one task queue.
    ProcessPool,
    /// One process per task, crash-aware.
    SupervisedProcessPool,
}

impl StrategyKind {
    /// Stable tag used in logs and progress lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Inline => "inline",
            StrategyKind::ThreadPool => "thread-pool",
            StrategyKind::ProcessPool => "process-pool",
            StrategyKind::SupervisedProcessPool => "supervised-process-pool",
        }
    }

    /// Returns `true` when tasks run in separate OS processes.
    pub fn is_process_based(&self) -> bool {
        matches!(
            self,
            StrategyKind::ProcessPool | StrategyKind::SupervisedProcessPool
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "inline" | "single" => Ok(StrategyKind::Inline),
            "thread-pool" | "thread" => Ok(StrategyKind::ThreadPool),
            "process-pool" | "process" => Ok(StrategyKind::ProcessPool),
            "supervised-process-pool" | "x-process" => Ok(StrategyKind::SupervisedProcessPool),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_and_aliases() {
        assert_eq!("inline".parse::<StrategyKind>(), Ok(StrategyKind::Inline));
        assert_eq!("single".parse::<StrategyKind>(), Ok(StrategyKind::Inline));
        assert_eq!("Thread".parse::<StrategyKind>(), Ok(StrategyKind::ThreadPool));
        assert_eq!(" process-pool ".parse::<StrategyKind>(), Ok(StrategyKind::ProcessPool));
        assert_eq!("x-process".parse::<StrategyKind>(), Ok(StrategyKind::SupervisedProcessPool));
        assert_eq!(
            "supervised-process-pool".parse::<StrategyKind>(),
            Ok(StrategyKind::SupervisedProcessPool)
        );
    }

    #[test]
    fn unknown_tag_is_configuration_error() {
        let err = "fibers".parse::<StrategyKind>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownStrategy("fibers".into()));
    }

    #[test]
    fn display_matches_tag() {
        for kind in [
            StrategyKind::Inline,
            StrategyKind::ThreadPool,
            StrategyKind::ProcessPool,
            StrategyKind::SupervisedProcessPool,
        ] {
            assert_eq!(kind.to_string().parse::<StrategyKind>(), Ok(kind));
        }
        assert!(StrategyKind::ProcessPool.is_process_based());
        assert!(!StrategyKind::ThreadPool.is_process_based());
    }
}
