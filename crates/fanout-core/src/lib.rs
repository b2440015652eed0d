pub mod dispatch;
pub use dispatch::dispatch;

pub mod error;
pub use error::CoreError;

pub mod executor;
pub use executor::Executor;

pub mod inline;
pub use inline::InlineExecutor;

pub mod registry;
pub use registry::FnRegistry;

pub mod slots;
pub use slots::OutputSlots;

pub mod thread_pool;
pub use thread_pool::ThreadPoolExecutor;
