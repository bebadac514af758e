#![forbid(unsafe_code)]

use qc_core::ids::{JobId, WorkerId};
use qc_core::{ConfigKey, JobState, NewJob, Outcome};
use qc_storage::{JobsListRequest, SqliteStore, StoreError};
use tempfile::TempDir;

fn open_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteStore::open(dir.path().join("queue.db")).expect("open store");
    (dir, store)
}

fn job_id(raw: &str) -> JobId {
    JobId::try_new(raw).expect("job id")
}

fn worker(raw: &str) -> WorkerId {
    WorkerId::try_new(raw).expect("worker id")
}

fn exit_with(code: i32) -> Outcome {
    Outcome {
        return_code: code,
        stdout: String::new(),
        stderr: if code == 0 { String::new() } else { "boom\n".to_string() },
        duration_ms: 5,
        timed_out: false,
    }
}

#[test]
fn enqueue_defaults_and_duplicate_conflict() {
    let (_dir, mut store) = open_store();

    let job = store
        .enqueue(&NewJob::new(job_id("a"), "echo a"), 1_000)
        .expect("enqueue");
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.priority, 0);
    assert_eq!(job.created_at_ms, 1_000);
    assert_eq!(job.updated_at_ms, 1_000);
    assert!(job.next_run_at_ms.is_none());
    assert!(job.locked_by.is_none());

    let err = store
        .enqueue(&NewJob::new(job_id("a"), "echo again"), 2_000)
        .expect_err("duplicate id must conflict");
    assert!(matches!(err, StoreError::JobAlreadyExists { ref job_id } if job_id == "a"));

    let stored = store.job_get(&job_id("a")).expect("get").expect("present");
    assert_eq!(stored.command, "echo a");
}

#[test]
fn enqueue_reads_max_retries_default_from_config() {
    let (_dir, mut store) = open_store();
    store
        .config_set(ConfigKey::MaxRetriesDefault, "5")
        .expect("config set");

    let defaulted = store
        .enqueue(&NewJob::new(job_id("d"), "true"), 1)
        .expect("enqueue");
    assert_eq!(defaulted.max_retries, 5);

    let explicit = store
        .enqueue(&NewJob::new(job_id("e"), "true").with_max_retries(0), 2)
        .expect("enqueue");
    assert_eq!(explicit.max_retries, 0);
}

#[test]
fn claim_prefers_priority_then_schedule_then_submission_order() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");

    store.enqueue(&NewJob::new(job_id("low-1"), "true"), 1_000).expect("enqueue");
    store
        .enqueue(&NewJob::new(job_id("high"), "true").with_priority(5), 1_001)
        .expect("enqueue");
    store.enqueue(&NewJob::new(job_id("low-2"), "true"), 1_002).expect("enqueue");

    let order: Vec<String> = (0..3)
        .map(|_| {
            store
                .claim(&w, 2_000)
                .expect("claim")
                .expect("job available")
                .id
                .to_string()
        })
        .collect();
    assert_eq!(order, vec!["high", "low-1", "low-2"]);
    assert!(store.claim(&w, 2_000).expect("claim").is_none());
}

#[test]
fn claim_prefers_unscheduled_jobs_over_due_retries() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");

    store.enqueue(&NewJob::new(job_id("retry"), "false"), 0).expect("enqueue");
    let claimed = store.claim(&w, 0).expect("claim").expect("job");
    let failed = store
        .settle(&claimed.id, &w, &exit_with(1), 0)
        .expect("settle");
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.next_run_at_ms, Some(2_000));

    // Not due yet and nothing else queued.
    assert!(store.claim(&w, 1_999).expect("claim").is_none());

    store.enqueue(&NewJob::new(job_id("fresh"), "true"), 100).expect("enqueue");
    let first = store.claim(&w, 5_000).expect("claim").expect("job");
    assert_eq!(first.id.as_str(), "fresh");
    let second = store.claim(&w, 5_000).expect("claim").expect("job");
    assert_eq!(second.id.as_str(), "retry");
    assert_eq!(second.attempts, 1);
}

#[test]
fn claim_marks_job_processing_and_owned() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    store.worker_register(&w, 42, 10).expect("register");
    store.enqueue(&NewJob::new(job_id("a"), "true"), 10).expect("enqueue");

    let job = store.claim(&w, 20).expect("claim").expect("job");
    assert_eq!(job.state, JobState::Processing);
    assert_eq!(job.locked_by.as_ref(), Some(&w));
    assert_eq!(job.locked_at_ms, Some(20));
    assert_eq!(job.updated_at_ms, 20);
    assert_eq!(job.attempts, 0);

    let info = store.worker_get(&w).expect("worker").expect("present");
    assert_eq!(info.current_job_id.as_ref(), Some(&job.id));

    store.settle(&job.id, &w, &exit_with(0), 30).expect("settle");
    let info = store.worker_get(&w).expect("worker").expect("present");
    assert!(info.current_job_id.is_none());
}

#[test]
fn success_completes_and_is_never_claimed_again() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    store.enqueue(&NewJob::new(job_id("ok1"), "echo ok"), 0).expect("enqueue");

    let job = store.claim(&w, 1).expect("claim").expect("job");
    let outcome = Outcome {
        return_code: 0,
        stdout: "ok\n".to_string(),
        stderr: String::new(),
        duration_ms: 3,
        timed_out: false,
    };
    let done = store.settle(&job.id, &w, &outcome, 2).expect("settle");
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.attempts, 1);
    assert_eq!(done.return_code, Some(0));
    assert_eq!(done.stdout.as_deref(), Some("ok\n"));
    assert_eq!(done.duration_ms, Some(3));
    assert!(done.locked_by.is_none());
    assert!(done.locked_at_ms.is_none());
    assert!(done.last_error.is_none());

    assert!(store.claim(&w, i64::MAX).expect("claim").is_none());
}

#[test]
fn failures_back_off_exponentially_then_die() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    store
        .enqueue(&NewJob::new(job_id("bad1"), "exit 1").with_max_retries(2), 0)
        .expect("enqueue");

    let job = store.claim(&w, 10_000).expect("claim").expect("job");
    let first = store.settle(&job.id, &w, &exit_with(1), 10_000).expect("settle");
    assert_eq!(first.state, JobState::Failed);
    assert_eq!(first.attempts, 1);
    assert_eq!(first.next_run_at_ms, Some(12_000));
    assert_eq!(first.last_error.as_deref(), Some("exit code 1"));
    assert_eq!(first.stderr.as_deref(), Some("boom\n"));

    let job = store.claim(&w, 12_000).expect("claim").expect("due at the gate");
    let second = store.settle(&job.id, &w, &exit_with(1), 50_000).expect("settle");
    assert_eq!(second.state, JobState::Failed);
    assert_eq!(second.attempts, 2);
    assert_eq!(second.next_run_at_ms, Some(54_000));

    assert!(store.claim(&w, 53_999).expect("claim").is_none());
    let job = store.claim(&w, 54_000).expect("claim").expect("job");
    let third = store.settle(&job.id, &w, &exit_with(1), 60_000).expect("settle");
    assert_eq!(third.state, JobState::Dead);
    assert_eq!(third.attempts, 3);
    assert!(third.locked_by.is_none());

    assert!(store.claim(&w, i64::MAX).expect("claim").is_none());
}

#[test]
fn timeout_outcome_records_timed_out_error() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    store.enqueue(&NewJob::new(job_id("slow"), "sleep 60"), 0).expect("enqueue");

    let job = store.claim(&w, 0).expect("claim").expect("job");
    let outcome = Outcome {
        return_code: -1,
        stdout: String::new(),
        stderr: "TIMEOUT after 1s".to_string(),
        duration_ms: 1_000,
        timed_out: true,
    };
    let settled = store.settle(&job.id, &w, &outcome, 1_000).expect("settle");
    assert_eq!(settled.state, JobState::Failed);
    assert_eq!(settled.return_code, Some(-1));
    assert_eq!(settled.last_error.as_deref(), Some("timed out"));
}

#[test]
fn backoff_base_change_applies_to_the_next_settle() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    store.config_set(ConfigKey::BackoffBase, "3").expect("config set");
    store.enqueue(&NewJob::new(job_id("a"), "false"), 0).expect("enqueue");

    let job = store.claim(&w, 0).expect("claim").expect("job");
    let failed = store.settle(&job.id, &w, &exit_with(2), 1_000).expect("settle");
    assert_eq!(failed.next_run_at_ms, Some(4_000));
}

#[test]
fn settle_by_non_owner_is_rejected() {
    let (_dir, mut store) = open_store();
    let owner = worker("w1");
    let other = worker("w2");
    store.enqueue(&NewJob::new(job_id("a"), "true"), 0).expect("enqueue");

    let job = store.claim(&owner, 1).expect("claim").expect("job");
    let err = store
        .settle(&job.id, &other, &exit_with(0), 2)
        .expect_err("not the owner");
    assert!(matches!(err, StoreError::ClaimMismatch { .. }));

    let unchanged = store.job_get(&job.id).expect("get").expect("present");
    assert_eq!(unchanged.state, JobState::Processing);
    assert_eq!(unchanged.attempts, 0);

    store.settle(&job.id, &owner, &exit_with(0), 3).expect("settle");
    let err = store
        .settle(&job.id, &owner, &exit_with(0), 4)
        .expect_err("already settled");
    assert!(matches!(err, StoreError::ClaimMismatch { .. }));

    let err = store
        .settle(&job_id("missing"), &owner, &exit_with(0), 5)
        .expect_err("unknown job");
    assert!(matches!(err, StoreError::UnknownJob { .. }));
}

#[test]
fn list_filters_by_state_in_submission_order() {
    let (_dir, mut store) = open_store();
    let w = worker("w1");
    for (i, id) in ["c", "a", "b"].into_iter().enumerate() {
        store
            .enqueue(&NewJob::new(job_id(id), "true"), i as i64)
            .expect("enqueue");
    }
    let job = store.claim(&w, 10).expect("claim").expect("job");
    assert_eq!(job.id.as_str(), "c");

    let all = store.jobs_list(&JobsListRequest::default()).expect("list");
    let ids: Vec<&str> = all.iter().map(|job| job.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]);

    let pending = store
        .jobs_list(&JobsListRequest {
            state: Some(JobState::Pending),
            limit: 1,
        })
        .expect("list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id.as_str(), "a");

    let processing = store
        .jobs_list(&JobsListRequest {
            state: Some(JobState::Processing),
            ..JobsListRequest::default()
        })
        .expect("list");
    assert_eq!(processing.len(), 1);

    let counts = store.state_counts().expect("counts");
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.processing, 1);
    assert_eq!(counts.total(), 3);
}
