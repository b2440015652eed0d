use fanout_exec::WorkerCommand;
use fanout_model::{ConfigError, StrategyKind};
use fanout_observe::ReporterConfig;

/// Settings of one [`run_with_concurrent`](crate::run_with_concurrent) call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub strategy: StrategyKind,
    /// Upper bound of simultaneously running workers.
    pub concurrency: usize,
    pub reporter: ReporterConfig,
    /// Return the first captured failure as an error once the whole run is accounted for.
    pub raise_on_error: bool,
    /// Worker processes to launch; defaults to the current executable.
    pub worker: Option<WorkerCommand>,
}

impl RunOptions {
    pub fn new(strategy: StrategyKind, concurrency: usize) -> Self {
        Self {
            strategy,
            concurrency,
            ..Self::default()
        }
    }

    /// Selects the strategy by its tag (`inline`, `thread-pool`, `x-process`, ...).
    pub fn with_strategy_tag(mut self, tag: &str) -> Result<Self, ConfigError> {
        self.strategy = tag.parse()?;
        Ok(self)
    }

    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ThreadPool,
            concurrency: 1,
            reporter: ReporterConfig::print(),
            raise_on_error: false,
            worker: None,
        }
    }
}

/// Settings of one [`run_with_resource_broker`](crate::run_with_resource_broker) call.
///
/// The number of workers is the number of resource contexts.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub reporter: ReporterConfig,
    pub worker: Option<WorkerCommand>,
    /// Run every task in a one-shot child of its bound worker.
    pub isolate_tasks: bool,
}

impl BrokerOptions {
    pub fn with_reporter(mut self, reporter: ReporterConfig) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_isolation(mut self, isolate_tasks: bool) -> Self {
        self.isolate_tasks = isolate_tasks;
        self
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            reporter: ReporterConfig::print(),
            worker: None,
            isolate_tasks: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanout_observe::ReporterKind;

    #[test]
    fn default_options() {
        let opts = RunOptions::default();
        assert_eq!(opts.strategy, StrategyKind::ThreadPool);
        assert_eq!(opts.concurrency, 1);
        assert_eq!(opts.reporter.kind, ReporterKind::Print);
        assert!(!opts.raise_on_error);
        assert!(opts.worker.is_none());

        assert!(BrokerOptions::default().isolate_tasks);
    }

    #[test]
    fn strategy_tag_aliases() {
        let opts = RunOptions::default().with_strategy_tag("x-process").unwrap();
        assert_eq!(opts.strategy, StrategyKind::SupervisedProcessPool);

        let err = RunOptions::default().with_strategy_tag("fork-bomb").unwrap_err();
        assert_eq!(err, ConfigError::UnknownStrategy("fork-bomb".into()));
    }
}
