#![forbid(unsafe_code)]

use assert_cmd::Command;
use predicates::prelude::*;
use qc_core::ids::JobId;
use qc_core::{JobState, WorkerState};
use qc_storage::SqliteStore;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn queuectl(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("queuectl").expect("queuectl binary");
    cmd.arg("--db").arg(db).env_remove("QUEUECTL_DB").env("RUST_LOG", "warn");
    cmd
}

fn scratch_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db = dir.path().join("queue.db");
    (dir, db)
}

#[test]
fn enqueue_then_list_and_status() {
    let (_dir, db) = scratch_db();

    queuectl(&db)
        .args(["enqueue", r#"{"id":"job1","command":"echo hi"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "pending""#))
        .stdout(predicate::str::contains(r#""max_retries": 3"#));

    queuectl(&db)
        .args(["enqueue", r#"{"id":"job2","command":"true"}"#, "--priority", "-4"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""priority": -4"#));

    queuectl(&db)
        .args(["list", "--state", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "job1""#))
        .stdout(predicate::str::contains(r#""id": "job2""#));

    queuectl(&db)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""pending": 2"#))
        .stdout(predicate::str::contains(r#""shutdown_requested": false"#));
}

#[test]
fn enqueue_reads_record_from_file() {
    let (dir, db) = scratch_db();
    let record = dir.path().join("job.json");
    std::fs::write(&record, r#"{"id":"from-file","command":"true","max_retries":1}"#)
        .expect("write record");

    queuectl(&db)
        .arg("enqueue")
        .arg("--file")
        .arg(&record)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "from-file""#))
        .stdout(predicate::str::contains(r#""max_retries": 1"#));
}

#[test]
fn invalid_submissions_are_rejected() {
    let (_dir, db) = scratch_db();

    queuectl(&db)
        .args(["enqueue", r#"{"id":"dup","command":"true"}"#])
        .assert()
        .success();
    queuectl(&db)
        .args(["enqueue", r#"{"id":"dup","command":"true"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    queuectl(&db)
        .args(["enqueue", r#"{"id":"x","command":"true","state":"completed"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("state"));

    queuectl(&db)
        .args(["enqueue", r#"{"command":"true"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("id"));

    queuectl(&db)
        .args(["enqueue", "not json"])
        .assert()
        .failure();

    queuectl(&db).arg("enqueue").assert().failure();
}

#[test]
fn config_get_and_set() {
    let (_dir, db) = scratch_db();

    queuectl(&db)
        .args(["config", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""backoff_base": 2"#))
        .stdout(predicate::str::contains(r#""max_retries_default": 3"#))
        .stdout(predicate::str::contains(r#""job_timeout_sec": 0"#));

    queuectl(&db)
        .args(["config", "set", "backoff_base", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""backoff_base": 3"#));

    queuectl(&db)
        .args(["config", "get", "backoff_base"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""backoff_base": 3"#));

    queuectl(&db)
        .args(["config", "set", "backoff_base", "0"])
        .assert()
        .failure();
    queuectl(&db)
        .args(["config", "set", "colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn dlq_retry_reports_wrong_state_and_unknown_ids() {
    let (_dir, db) = scratch_db();
    queuectl(&db)
        .args(["enqueue", r#"{"id":"alive","command":"true"}"#])
        .assert()
        .success();

    queuectl(&db)
        .args(["dlq", "retry", "alive"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in the dead letter queue"));

    queuectl(&db)
        .args(["dlq", "retry", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    queuectl(&db)
        .args(["dlq", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

/// Stops spawned workers even when an assertion fails midway.
struct StopOnDrop(PathBuf);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let _ = queuectl(&self.0).args(["worker", "stop"]).output();
    }
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}

#[cfg(unix)]
#[test]
fn worker_start_processes_jobs_and_stop_drains() {
    let (_dir, db) = scratch_db();
    let _guard = StopOnDrop(db.clone());

    queuectl(&db)
        .args(["enqueue", r#"{"id":"ok1","command":"echo ok"}"#])
        .assert()
        .success();
    queuectl(&db)
        .args(["enqueue", r#"{"id":"bad1","command":"exit 1","max_retries":0}"#])
        .assert()
        .success();

    queuectl(&db)
        .args(["--poll-ms", "50", "worker", "start", "--count", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("started"));

    let store = SqliteStore::open(&db).expect("open");
    let ok1 = JobId::try_new("ok1").expect("id");
    let bad1 = JobId::try_new("bad1").expect("id");
    let settled = wait_until(Duration::from_secs(20), || {
        let ok = store.job_get(&ok1).ok().flatten();
        let bad = store.job_get(&bad1).ok().flatten();
        ok.is_some_and(|job| job.state == JobState::Completed)
            && bad.is_some_and(|job| job.state == JobState::Dead)
    });
    assert!(settled, "jobs did not settle");

    let job = store.job_get(&ok1).expect("get").expect("present");
    assert_eq!(job.return_code, Some(0));
    assert_eq!(job.stdout.as_deref(), Some("ok\n"));

    queuectl(&db)
        .args(["worker", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""shutdown_requested": true"#));

    let stopped = wait_until(Duration::from_secs(20), || {
        store.workers_list().is_ok_and(|rows| {
            rows.len() == 2 && rows.iter().all(|row| row.state == WorkerState::Stopped)
        })
    });
    assert!(stopped, "workers did not stop");
    assert!(store.shutdown_requested().expect("flag"));

    queuectl(&db)
        .args(["dlq", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id": "bad1""#));

    queuectl(&db)
        .args(["dlq", "retry", "bad1", "--max-retries", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "pending""#))
        .stdout(predicate::str::contains(r#""attempts": 1"#));
}
