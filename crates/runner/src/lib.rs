#![forbid(unsafe_code)]

//! Worker side of the queue: command execution, the claim/execute/settle loop, stop
//! coordination and the process supervisor behind `queuectl worker`.

mod error;
pub mod executor;
pub mod logging;
pub mod pool;
pub mod shutdown;
pub mod supervisor;
pub mod worker;

pub use error::RunnerError;
pub use pool::WorkerPool;
pub use shutdown::{StopSignal, install_signal_listener};
pub use supervisor::Supervisor;
pub use worker::{Worker, WorkerOptions, WorkerReport};
