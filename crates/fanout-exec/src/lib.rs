//! Process-backed execution strategies.
//!
//! - [`SupervisedPool`]: one short-lived process per task, at most `max_workers` alive,
//!   crashes reported as failures of the task that was running.
//! - [`Fleet`]: long-lived worker processes pulling from one shared queue; the engine
//!   behind both the plain process pool and the [`ResourceBroker`].
//!
//! Worker processes re-execute a [`WorkerCommand`] (by default the current executable),
//! which must call [`serve_if_worker`] before doing anything else.

mod error;
pub use error::ExecError;

pub mod command;
pub use command::{CONTEXT_ID_ENV, RUN_ID_ENV, WORKER_MODE_ENV, WorkerCommand, WorkerMode};

pub mod limits;
pub use limits::RlimitConfig;

pub mod proto;

mod util;

pub mod worker;
pub use worker::{context_id, serve_if_worker};

pub mod supervised;
pub use supervised::{Liveness, PoolConfig, SupervisedPool};

pub mod fleet;
pub use fleet::Fleet;

pub mod broker;
pub use broker::{BrokerConfig, ResourceBroker};

pub mod prelude {
    pub use crate::error::ExecError;
    pub use crate::{
        BrokerConfig, Fleet, PoolConfig, ResourceBroker, SupervisedPool, WorkerCommand,
        serve_if_worker,
    };
}
