//! Run a batch of independent tasks concurrently and get the results back in input order.
//!
//! Functions are registered by name in a [`FnRegistry`]; process-based strategies re-execute
//! the host program, so `main` must hand control to [`serve_if_worker`] before anything else:
//!
//! ```no_run
//! use fanout::{FnRegistry, RunOptions, StrategyKind};
//! use serde_json::json;
//!
//! fn registry() -> FnRegistry {
//!     let mut reg = FnRegistry::new();
//!     reg.register("double", |(x,): (i64,)| Ok::<_, String>(x * 2));
//!     reg
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fanout::CoreError> {
//!     fanout::serve_if_worker(&registry());
//!
//!     let opts = RunOptions::new(StrategyKind::SupervisedProcessPool, 4);
//!     let out = fanout::run_with_concurrent(&registry(), "double", vec![json!(1), json!(2)], &opts).await?;
//!     assert_eq!(out[1].value(), Some(&json!(4)));
//!     Ok(())
//! }
//! ```

mod options;
pub use options::{BrokerOptions, RunOptions};

mod run;
pub use run::{run_with_concurrent, run_with_resource_broker};

pub use fanout_core::{CoreError, Executor, FnRegistry};
pub use fanout_exec::{
    BrokerConfig, Fleet, PoolConfig, ResourceBroker, RlimitConfig, SupervisedPool, WorkerCommand,
    context_id, serve_if_worker,
};
pub use fanout_model::{
    ConfigError, ExitInfo, FailureKind, Outcome, ResourceContext, ResultEnvelope, StrategyKind,
    Task, TaskFailure, TaskIndex,
};
pub use fanout_observe::{
    LoggerConfig, LoggerError, LoggerFormat, ReporterConfig, ReporterKind, logger_init,
};
