#![forbid(unsafe_code)]

use qc_core::ids::{JobId, WorkerId};
use qc_core::{JobState, NewJob, Outcome};
use qc_storage::{JobsListRequest, SqliteStore, StoreError};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

const WORKERS: usize = 4;
const JOBS: usize = 40;

fn retry_on_contention<T>(mut op: impl FnMut() -> Result<T, StoreError>) -> T {
    loop {
        match op() {
            Ok(value) => return value,
            Err(err) if err.is_contention() => thread::yield_now(),
            Err(err) => panic!("store error: {err}"),
        }
    }
}

#[test]
fn concurrent_workers_claim_each_job_exactly_once() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("queue.db");

    let mut seed = SqliteStore::open(&path).expect("open");
    for i in 0..JOBS {
        let id = JobId::try_new(format!("job-{i:03}")).expect("job id");
        seed.enqueue(&NewJob::new(id, "true"), i as i64).expect("enqueue");
    }

    // Connections are opened up front so schema install never races.
    let stores: Vec<SqliteStore> = (0..WORKERS)
        .map(|_| SqliteStore::open(&path).expect("open"))
        .collect();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(n, mut store)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let worker = WorkerId::try_new(format!("w{n}")).expect("worker id");
                barrier.wait();
                let mut claimed = Vec::new();
                loop {
                    let next = retry_on_contention(|| store.claim(&worker, 1_000));
                    let Some(job) = next else { break };
                    assert_eq!(job.locked_by.as_ref(), Some(&worker));
                    let outcome = Outcome {
                        return_code: 0,
                        stdout: worker.to_string(),
                        stderr: String::new(),
                        duration_ms: 0,
                        timed_out: false,
                    };
                    retry_on_contention(|| store.settle(&job.id, &worker, &outcome, 1_001));
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().expect("worker thread") {
            assert!(seen.insert(id.clone()), "job {id} claimed twice");
            total += 1;
        }
    }
    assert_eq!(total, JOBS);

    let jobs = seed.jobs_list(&JobsListRequest::default()).expect("list");
    assert_eq!(jobs.len(), JOBS);
    for job in jobs {
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 1);
        assert!(job.locked_by.is_none());
    }
}
