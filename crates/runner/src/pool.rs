#![forbid(unsafe_code)]

use crate::worker::{Worker, WorkerOptions, WorkerReport, new_worker_id};
use crate::{RunnerError, StopSignal};
use qc_core::ids::WorkerId;
use qc_storage::SqliteStore;
use std::path::Path;
use std::thread::{self, JoinHandle};
use tracing::info;

/// `count` worker loops on OS threads in this process, each with its own connection.
///
/// Coordination still goes through the database only: the threads share nothing but the
/// local [`StopSignal`].
pub struct WorkerPool {
    stop: StopSignal,
    workers: Vec<(WorkerId, JoinHandle<Result<WorkerReport, RunnerError>>)>,
}

impl WorkerPool {
    pub fn start(
        db_path: impl AsRef<Path>,
        count: usize,
        options: WorkerOptions,
    ) -> Result<Self, RunnerError> {
        Self::start_with_signal(db_path, count, options, StopSignal::new())
    }

    /// Like [`Self::start`], but stops when `stop` is requested (e.g. by the signal listener).
    pub fn start_with_signal(
        db_path: impl AsRef<Path>,
        count: usize,
        options: WorkerOptions,
        stop: StopSignal,
    ) -> Result<Self, RunnerError> {
        let db_path = db_path.as_ref();

        // Open every connection before any loop starts so schema install never races.
        let mut prepared = Vec::with_capacity(count);
        for index in 0..count {
            let id = new_worker_id(index)?;
            let store = SqliteStore::open(db_path)?;
            prepared.push(Worker::new(id, store, options.clone(), stop.clone()));
        }

        let mut workers = Vec::with_capacity(count);
        for worker in prepared {
            let id = worker.id().clone();
            let handle = thread::Builder::new()
                .name(format!("qc-worker-{id}"))
                .spawn(move || worker.run())?;
            workers.push((id, handle));
        }
        info!(count, db = %db_path.display(), "worker pool started");
        Ok(Self { stop, workers })
    }

    pub fn worker_ids(&self) -> impl Iterator<Item = &WorkerId> {
        self.workers.iter().map(|(id, _)| id)
    }

    /// Asks every loop to stop after its current job. Does not wait.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Waits for every loop to exit. The first worker error wins; the rest are still joined.
    pub fn join(self) -> Result<Vec<WorkerReport>, RunnerError> {
        let mut reports = Vec::with_capacity(self.workers.len());
        let mut first_error = None;
        for (id, handle) in self.workers {
            let outcome = match handle.join() {
                Ok(outcome) => outcome,
                Err(_) => Err(RunnerError::WorkerPanicked {
                    worker_id: id.to_string(),
                }),
            };
            match outcome {
                Ok(report) => reports.push(report),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(reports),
        }
    }
}
