#![forbid(unsafe_code)]

//! Starting and stopping detached worker processes.
//!
//! Spawned workers are re-invocations of the current executable (`worker run --id`).
//! Their ids and pids go to a pidfile next to the database so `stop` can find them
//! again from a different invocation.

use crate::RunnerError;
use crate::worker::new_worker_id;
use qc_core::ids::WorkerId;
use qc_core::{WorkerState, now_ms};
use qc_storage::SqliteStore;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

const PIDFILE_SUFFIX: &str = ".workers.pids";
const LOGFILE_SUFFIX: &str = ".workers.log";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerProcess {
    pub worker_id: String,
    pub pid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StopTarget {
    pub worker_id: String,
    pub pid: u32,
    /// Whether SIGTERM was delivered. Workers that miss it still see the durable flag.
    pub signaled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub shutdown_requested: bool,
    pub targets: Vec<StopTarget>,
}

pub fn pidfile_path(db_path: &Path) -> PathBuf {
    sibling_with_suffix(db_path, PIDFILE_SUFFIX)
}

pub fn logfile_path(db_path: &Path) -> PathBuf {
    sibling_with_suffix(db_path, LOGFILE_SUFFIX)
}

fn sibling_with_suffix(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "queue.db".into());
    name.push(suffix);
    db_path.with_file_name(name)
}

#[derive(Clone, Debug)]
pub struct Supervisor {
    db_path: PathBuf,
    exe: PathBuf,
    poll_ms: Option<u64>,
}

impl Supervisor {
    /// A supervisor that spawns the currently running executable.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, RunnerError> {
        let exe = std::env::current_exe().map_err(RunnerError::CurrentExe)?;
        Ok(Self::with_executable(db_path, exe))
    }

    pub fn with_executable(db_path: impl Into<PathBuf>, exe: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            exe: exe.into(),
            poll_ms: None,
        }
    }

    /// Poll interval forwarded to every spawned worker.
    pub fn poll_ms(mut self, poll_ms: Option<u64>) -> Self {
        self.poll_ms = poll_ms;
        self
    }

    /// Clears the shutdown flag, then spawns `count` detached worker processes.
    pub fn start(&self, count: usize) -> Result<Vec<WorkerProcess>, RunnerError> {
        // Opening here installs the schema before any child races to do it.
        let mut store = SqliteStore::open(&self.db_path)?;
        if store.shutdown_requested()? {
            store.clear_shutdown(now_ms())?;
            info!("cleared shutdown flag left by a previous stop");
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(logfile_path(&self.db_path))?;
        let mut pidfile = OpenOptions::new()
            .create(true)
            .append(true)
            .open(pidfile_path(&self.db_path))?;

        let mut spawned = Vec::with_capacity(count);
        for index in 0..count {
            let id = new_worker_id(index)?;
            let mut cmd = self.worker_command(&id);
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::from(log.try_clone()?));
            detach(&mut cmd);

            let child = cmd.spawn()?;
            let pid = child.id();
            writeln!(pidfile, "{id},{pid}")?;
            info!(worker.id = %id, pid, "worker process spawned");
            spawned.push(WorkerProcess {
                worker_id: id.to_string(),
                pid,
            });
        }
        pidfile.flush()?;
        Ok(spawned)
    }

    /// Sets the durable shutdown flag and nudges every recorded worker with SIGTERM.
    ///
    /// Never kills: each worker finishes its current job first. Signals only go to pids
    /// whose worker row still matches and is not stopped, so a recycled pid is left alone.
    pub fn stop(&self) -> Result<StopReport, RunnerError> {
        let mut store = SqliteStore::open(&self.db_path)?;
        store.request_shutdown(now_ms())?;

        let pidfile = pidfile_path(&self.db_path);
        let mut targets = Vec::new();
        for entry in read_pidfile(&pidfile)? {
            let live = match WorkerId::try_new(entry.worker_id.as_str()) {
                Ok(id) => store
                    .worker_get(&id)?
                    .is_some_and(|row| row.pid == entry.pid && row.state != WorkerState::Stopped),
                Err(_) => false,
            };
            let signaled = live && signal_terminate(entry.pid);
            debug!(worker.id = %entry.worker_id, pid = entry.pid, live, signaled, "stop target");
            targets.push(StopTarget {
                worker_id: entry.worker_id,
                pid: entry.pid,
                signaled,
            });
        }

        match fs::remove_file(&pidfile) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        info!(targets = targets.len(), "shutdown requested");
        Ok(StopReport {
            shutdown_requested: true,
            targets,
        })
    }

    fn worker_command(&self, id: &WorkerId) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("--db").arg(&self.db_path);
        if let Some(poll_ms) = self.poll_ms {
            cmd.arg("--poll-ms").arg(poll_ms.to_string());
        }
        cmd.args(["worker", "run", "--id", id.as_str()]);
        cmd
    }
}

/// Reads `<worker_id>,<pid>` lines. A missing file means no recorded workers.
pub fn read_pidfile(path: &Path) -> Result<Vec<WorkerProcess>, RunnerError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut out = Vec::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let parsed = line
            .split_once(',')
            .and_then(|(id, pid)| Some((id.trim(), pid.trim().parse::<u32>().ok()?)));
        match parsed {
            Some((worker_id, pid)) if !worker_id.is_empty() => out.push(WorkerProcess {
                worker_id: worker_id.to_string(),
                pid,
            }),
            _ => warn!(line, "skipping malformed pidfile line"),
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}

#[cfg(unix)]
fn signal_terminate(pid: u32) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(pid) => kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn signal_terminate(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_files_sit_next_to_the_database() {
        let db = Path::new("/var/lib/qc/queue.db");
        assert_eq!(pidfile_path(db), Path::new("/var/lib/qc/queue.db.workers.pids"));
        assert_eq!(logfile_path(db), Path::new("/var/lib/qc/queue.db.workers.log"));
        assert_eq!(
            pidfile_path(Path::new("queue.db")),
            Path::new("queue.db.workers.pids")
        );
    }

    #[test]
    fn pidfile_parsing_skips_garbage() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("q.db.workers.pids");
        fs::write(&path, "w-1,100\n\nnot a line\nw-2, 200 \n,300\nw-3,abc\n").expect("write");

        let entries = read_pidfile(&path).expect("read");
        assert_eq!(
            entries,
            vec![
                WorkerProcess {
                    worker_id: "w-1".to_string(),
                    pid: 100
                },
                WorkerProcess {
                    worker_id: "w-2".to_string(),
                    pid: 200
                },
            ]
        );
        assert!(read_pidfile(&dir.path().join("missing")).expect("read").is_empty());
    }

    #[test]
    fn stop_sets_flag_and_skips_stale_pids() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("queue.db");
        let mut store = SqliteStore::open(&db).expect("open");
        let id = WorkerId::try_new("w-stale").expect("id");
        store.worker_register(&id, 999_999, 1).expect("register");
        store
            .worker_set_state(&id, WorkerState::Stopped, 2)
            .expect("stopped");
        fs::write(pidfile_path(&db), "w-stale,999999\nw-unknown,999998\n").expect("write");

        let report = Supervisor::with_executable(&db, "/bin/false")
            .stop()
            .expect("stop");
        assert!(report.shutdown_requested);
        assert_eq!(report.targets.len(), 2);
        assert!(report.targets.iter().all(|target| !target.signaled));
        assert!(store.shutdown_requested().expect("flag"));
        assert!(!pidfile_path(&db).exists());
    }
}
