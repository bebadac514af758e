#![forbid(unsafe_code)]

mod config;
mod error;
mod job;
mod retry;
mod submission;
mod worker;

pub use config::{ConfigKey, QueueConfig};
pub use error::ValidationError;
pub use job::{Job, JobState, Outcome};
pub use retry::{SettleUpdate, backoff_delay_ms, settle};
pub use submission::{JobSubmission, NewJob};
pub use worker::{WorkerInfo, WorkerState};

pub mod ids {
    use serde::Serialize;
    use std::fmt;

    const MAX_ID_LEN: usize = 128;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        TooLong,
        InvalidChar { ch: char, index: usize },
    }

    impl fmt::Display for IdError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Empty => write!(f, "must not be empty"),
                Self::TooLong => write!(f, "must be at most {MAX_ID_LEN} characters"),
                Self::InvalidChar { ch, index } => {
                    write!(f, "invalid character {ch:?} at index {index}")
                }
            }
        }
    }

    fn validate_id(value: &str) -> Result<(), IdError> {
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.chars().count() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        for (index, ch) in value.chars().enumerate() {
            if ch.is_whitespace() || ch.is_control() {
                return Err(IdError::InvalidChar { ch, index });
            }
        }
        Ok(())
    }

    /// Caller-supplied job identity. Unique across the store.
    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
    #[serde(transparent)]
    pub struct JobId(String);

    impl JobId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_id(&value)?;
            Ok(Self(value))
        }
    }

    impl fmt::Display for JobId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
    #[serde(transparent)]
    pub struct WorkerId(String);

    impl WorkerId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_id(&value)?;
            Ok(Self(value))
        }
    }

    impl fmt::Display for WorkerId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
