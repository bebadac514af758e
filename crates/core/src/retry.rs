#![forbid(unsafe_code)]

use crate::{Job, JobState, Outcome, QueueConfig};

/// Delay before the next attempt: `base ^ attempts` seconds, saturating.
pub fn backoff_delay_ms(base: u32, attempts: u32) -> i64 {
    u64::from(base)
        .checked_pow(attempts)
        .and_then(|secs| secs.checked_mul(1000))
        .and_then(|ms| i64::try_from(ms).ok())
        .unwrap_or(i64::MAX)
}

/// Column values written back when an attempt finishes. Lock fields are always cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettleUpdate {
    pub state: JobState,
    pub attempts: u32,
    pub next_run_at_ms: Option<i64>,
    pub last_error: Option<String>,
}

/// Decides the next state of `job` from the outcome of the attempt that just ran.
///
/// `attempts` is incremented exactly once. A failure moves the job to `dead` once the
/// post-increment count exceeds `max_retries`; otherwise it becomes `failed` and is
/// gated by `now + backoff_base ^ attempts` seconds.
pub fn settle(job: &Job, outcome: &Outcome, now_ms: i64, config: &QueueConfig) -> SettleUpdate {
    let attempts = job.attempts.saturating_add(1);

    if outcome.is_success() {
        return SettleUpdate {
            state: JobState::Completed,
            attempts,
            next_run_at_ms: None,
            last_error: None,
        };
    }

    let last_error = if outcome.timed_out {
        "timed out".to_string()
    } else {
        format!("exit code {}", outcome.return_code)
    };

    if attempts > job.max_retries {
        return SettleUpdate {
            state: JobState::Dead,
            attempts,
            next_run_at_ms: None,
            last_error: Some(last_error),
        };
    }

    let delay_ms = backoff_delay_ms(config.backoff_base, attempts);
    SettleUpdate {
        state: JobState::Failed,
        attempts,
        next_run_at_ms: Some(now_ms.saturating_add(delay_ms)),
        last_error: Some(last_error),
    }
}
