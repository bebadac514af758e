#![forbid(unsafe_code)]

use crate::ValidationError;
use serde::Serialize;
use std::time::Duration;

/// Keys of the durable `config` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    BackoffBase,
    MaxRetriesDefault,
    JobTimeoutSec,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::BackoffBase,
        ConfigKey::MaxRetriesDefault,
        ConfigKey::JobTimeoutSec,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BackoffBase => "backoff_base",
            Self::MaxRetriesDefault => "max_retries_default",
            Self::JobTimeoutSec => "job_timeout_sec",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == raw)
            .ok_or_else(|| ValidationError::UnknownConfigKey(raw.to_string()))
    }

    pub fn default_value(self) -> u64 {
        let defaults = QueueConfig::default();
        match self {
            Self::BackoffBase => u64::from(defaults.backoff_base),
            Self::MaxRetriesDefault => u64::from(defaults.max_retries_default),
            Self::JobTimeoutSec => defaults.job_timeout_sec,
        }
    }

    /// Parses and range-checks a raw value for this key.
    pub fn validate(self, raw: &str) -> Result<u64, ValidationError> {
        let invalid = |reason| ValidationError::InvalidConfigValue {
            key: self.as_str(),
            value: raw.to_string(),
            reason,
        };
        let value = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid("expected a non-negative integer"))?;
        match self {
            Self::BackoffBase if value == 0 => Err(invalid("must be at least 1")),
            Self::BackoffBase | Self::MaxRetriesDefault if value > u64::from(u32::MAX) => {
                Err(invalid("too large"))
            }
            _ => Ok(value),
        }
    }
}

/// Resolved queue tunables. Read by workers before every execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QueueConfig {
    pub backoff_base: u32,
    pub max_retries_default: u32,
    /// 0 disables the timeout.
    pub job_timeout_sec: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backoff_base: 2,
            max_retries_default: 3,
            job_timeout_sec: 0,
        }
    }
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_sec > 0).then(|| Duration::from_secs(self.job_timeout_sec))
    }
}
