#![forbid(unsafe_code)]

use qc_core::ValidationError;
use qc_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal setup failed: {0}")]
    Signal(String),

    #[error("{op} kept hitting lock contention after {attempts} attempts")]
    Contention { op: &'static str, attempts: u32 },

    #[error("worker thread {worker_id} panicked")]
    WorkerPanicked { worker_id: String },

    #[error("could not locate the queuectl executable: {0}")]
    CurrentExe(std::io::Error),
}
