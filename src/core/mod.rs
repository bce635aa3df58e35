//! Dispatch core: task model, bounded queue, worker pool, shutdown protocol.

pub mod dispatcher;
pub mod error;
pub mod task;

pub use dispatcher::{Dispatcher, LifecycleState};
pub use error::ClientError;
pub use task::DispatchTask;
