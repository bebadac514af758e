#![forbid(unsafe_code)]

use crate::executor;
use crate::{RunnerError, StopSignal};
use qc_core::ids::WorkerId;
use qc_core::{Job, JobState, QueueConfig, ValidationError, WorkerState, now_ms};
use qc_storage::{SqliteStore, StoreError};
use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Attempts per store operation before lock contention is treated as a store failure.
pub const CLAIM_RETRY_LIMIT: u32 = 8;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const HEARTBEAT_EVERY: Duration = Duration::from_secs(5);
const HEARTBEAT_LOCK_WAIT: Duration = Duration::from_millis(100);
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);
const CONTENTION_STEP: Duration = Duration::from_millis(25);

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    pub poll_interval: Duration,
    /// Upper bound of the random delay added to each idle sleep.
    pub poll_jitter: Duration,
    /// Recorded in the worker row.
    pub pid: u32,
    /// Stop once no pending, failed or processing job is left instead of polling forever.
    pub exit_when_drained: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_jitter: Duration::from_millis(100),
            pid: std::process::id(),
            exit_when_drained: false,
        }
    }
}

/// What one worker loop did before it stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl WorkerReport {
    fn record(&mut self, state: JobState) {
        self.processed += 1;
        match state {
            JobState::Completed => self.completed += 1,
            JobState::Failed => self.failed += 1,
            JobState::Dead => self.dead += 1,
            JobState::Pending | JobState::Processing => {}
        }
    }
}

/// `<pid>-<index>-<random>`: unique across restarts and across processes on one host.
pub fn new_worker_id(index: usize) -> Result<WorkerId, RunnerError> {
    let nonce: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let raw = format!("{}-{index}-{nonce}", std::process::id());
    WorkerId::try_new(raw).map_err(|err| ValidationError::InvalidWorkerId(err).into())
}

/// One claim → execute → settle loop bound to its own store connection.
///
/// Between jobs the loop checks the local [`StopSignal`] and the durable shutdown flag;
/// either one ends the loop once the job in hand has been settled. A job is never
/// interrupted by a stop request.
pub struct Worker {
    id: WorkerId,
    store: SqliteStore,
    options: WorkerOptions,
    stop: StopSignal,
}

impl Worker {
    pub fn new(id: WorkerId, store: SqliteStore, options: WorkerOptions, stop: StopSignal) -> Self {
        Self {
            id,
            store,
            options,
            stop,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Runs until stopped. Store failures are fatal: the worker marks itself stopped
    /// (best-effort) and returns the error.
    pub fn run(mut self) -> Result<WorkerReport, RunnerError> {
        let pid = self.options.pid;
        with_contention_retry("register", || {
            self.store.worker_register(&self.id, pid, now_ms())
        })?;
        info!(worker.id = %self.id, pid, "worker started");

        match self.run_loop() {
            Ok(report) => {
                with_contention_retry("stopping", || {
                    self.store
                        .worker_set_state(&self.id, WorkerState::Stopping, now_ms())
                })?;
                with_contention_retry("stopped", || {
                    self.store
                        .worker_set_state(&self.id, WorkerState::Stopped, now_ms())
                })?;
                info!(
                    worker.id = %self.id,
                    processed = report.processed,
                    completed = report.completed,
                    failed = report.failed,
                    dead = report.dead,
                    "worker stopped"
                );
                Ok(report)
            }
            Err(err) => {
                error!(worker.id = %self.id, error = %err, "worker exiting on store failure");
                if let Err(mark) =
                    self.store
                        .worker_set_state(&self.id, WorkerState::Stopped, now_ms())
                {
                    warn!(worker.id = %self.id, error = %mark, "could not mark worker stopped");
                }
                Err(err)
            }
        }
    }

    fn run_loop(&mut self) -> Result<WorkerReport, RunnerError> {
        let mut report = WorkerReport::default();
        loop {
            with_contention_retry("heartbeat", || {
                self.store.worker_heartbeat(&self.id, now_ms())
            })?;
            if self.stop_observed()? {
                return Ok(report);
            }

            // A config read failure must not strand a claimed job.
            let config = with_contention_retry("config", || self.store.queue_config())?;
            let claimed = with_contention_retry("claim", || self.store.claim(&self.id, now_ms()))?;
            match claimed {
                Some(job) => self.process(job, &config, &mut report)?,
                None => {
                    if self.options.exit_when_drained && self.queue_drained()? {
                        info!(worker.id = %self.id, "queue drained");
                        return Ok(report);
                    }
                    self.idle_sleep();
                }
            }
        }
    }

    fn stop_observed(&mut self) -> Result<bool, RunnerError> {
        if self.stop.is_requested() {
            info!(worker.id = %self.id, "local stop request observed");
            return Ok(true);
        }
        let durable = with_contention_retry("shutdown flag", || self.store.shutdown_requested())?;
        if durable {
            info!(worker.id = %self.id, "shutdown flag observed");
        }
        Ok(durable)
    }

    fn queue_drained(&mut self) -> Result<bool, RunnerError> {
        let counts = with_contention_retry("counts", || self.store.state_counts())?;
        Ok(counts.pending == 0 && counts.failed == 0 && counts.processing == 0)
    }

    fn process(
        &mut self,
        job: Job,
        config: &QueueConfig,
        report: &mut WorkerReport,
    ) -> Result<(), RunnerError> {
        info!(
            worker.id = %self.id,
            job.id = %job.id,
            attempt = job.attempts.saturating_add(1),
            "executing job"
        );

        let store = &mut self.store;
        let worker_id = &self.id;
        let outcome = executor::execute_with_ticks(
            &job.command,
            config.job_timeout(),
            HEARTBEAT_EVERY,
            &mut || {
                if let Err(err) =
                    store.worker_heartbeat_within(worker_id, now_ms(), HEARTBEAT_LOCK_WAIT)
                {
                    debug!(error = %err, "heartbeat skipped");
                }
            },
        );

        let settled = with_contention_retry("settle", || {
            self.store.settle(&job.id, &self.id, &outcome, now_ms())
        });
        let settled = match settled {
            Ok(settled) => settled,
            Err(RunnerError::Store(StoreError::ClaimMismatch { .. })) => {
                warn!(
                    worker.id = %self.id,
                    job.id = %job.id,
                    "job no longer held by this worker; outcome dropped"
                );
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        report.record(settled.state);
        info!(
            worker.id = %self.id,
            job.id = %settled.id,
            state = %settled.state,
            attempts = settled.attempts,
            return_code = outcome.return_code,
            duration_ms = outcome.duration_ms,
            timed_out = outcome.timed_out,
            "job settled"
        );
        Ok(())
    }

    fn idle_sleep(&self) {
        let jitter = random_up_to(self.options.poll_jitter);
        let deadline = Instant::now() + self.options.poll_interval + jitter;
        while !self.stop.is_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(STOP_CHECK_SLICE.min(deadline - now));
        }
    }
}

fn random_up_to(limit: Duration) -> Duration {
    if limit.is_zero() {
        return Duration::ZERO;
    }
    let max_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Re-runs `op` while it fails with lock contention, up to [`CLAIM_RETRY_LIMIT`] times.
fn with_contention_retry<T>(
    op: &'static str,
    mut f: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, RunnerError> {
    let mut attempts = 0;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_contention() => {
                attempts += 1;
                if attempts >= CLAIM_RETRY_LIMIT {
                    return Err(RunnerError::Contention { op, attempts });
                }
                let delay = CONTENTION_STEP * attempts + random_up_to(CONTENTION_STEP);
                debug!(op, attempts, delay_ms = delay.as_millis() as u64, "store busy; retrying");
                thread::sleep(delay);
            }
            Err(err) => return Err(err.into()),
        }
    }
}
