#![forbid(unsafe_code)]

use crate::ids::IdError;
use thiserror::Error;

/// Rejections raised at the submission boundary, before anything reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("job submission is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("job submission must be a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{0}` is assigned by the queue and cannot be submitted")]
    ServerAssignedField(String),

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(IdError),

    #[error("invalid worker id: {0}")]
    InvalidWorkerId(IdError),

    #[error("command must not be empty")]
    EmptyCommand,

    #[error("max_retries must be a non-negative integer")]
    NegativeMaxRetries,

    #[error("max_retries must be at most {max}")]
    MaxRetriesTooLarge { max: u32 },

    #[error("unknown job state `{0}`")]
    UnknownState(String),

    #[error("unknown worker state `{0}`")]
    UnknownWorkerState(String),

    #[error("unknown config key `{0}`")]
    UnknownConfigKey(String),

    #[error("invalid value `{value}` for config key `{key}`: {reason}")]
    InvalidConfigValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}
