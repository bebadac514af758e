#![forbid(unsafe_code)]

use crate::ValidationError;
use crate::ids::JobId;
use serde_json::{Map as JsonMap, Value as JsonValue};

const SUBMITTABLE_FIELDS: [&str; 4] = ["id", "command", "max_retries", "priority"];

const SERVER_ASSIGNED_FIELDS: [&str; 12] = [
    "state",
    "attempts",
    "created_at",
    "updated_at",
    "next_run_at",
    "locked_by",
    "locked_at",
    "last_error",
    "return_code",
    "stdout",
    "stderr",
    "duration_ms",
];

/// A fully validated submission. `max_retries: None` resolves to the configured default
/// inside the enqueue transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewJob {
    pub id: JobId,
    pub command: String,
    pub max_retries: Option<u32>,
    pub priority: i64,
}

impl NewJob {
    pub fn new(id: JobId, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            max_retries: None,
            priority: 0,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }
}

/// Loosely-typed submission record, exactly as a caller handed it in.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobSubmission {
    fields: JsonMap<String, JsonValue>,
}

impl JobSubmission {
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        let value: JsonValue = serde_json::from_str(text)
            .map_err(|err| ValidationError::MalformedJson(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, ValidationError> {
        match value {
            JsonValue::Object(fields) => Ok(Self { fields }),
            _ => Err(ValidationError::NotAnObject),
        }
    }

    /// Narrows the record into a [`NewJob`], rejecting anything the core must not see.
    pub fn validate(&self) -> Result<NewJob, ValidationError> {
        for key in self.fields.keys() {
            if SUBMITTABLE_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if SERVER_ASSIGNED_FIELDS.contains(&key.as_str()) {
                return Err(ValidationError::ServerAssignedField(key.clone()));
            }
            return Err(ValidationError::UnknownField(key.clone()));
        }

        let id = self
            .required_str("id")?
            .trim()
            .to_string();
        let id = JobId::try_new(id).map_err(ValidationError::InvalidJobId)?;

        let command = self.required_str("command")?;
        if command.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }

        let max_retries = match self.optional_i64("max_retries")? {
            Some(value) if value < 0 => return Err(ValidationError::NegativeMaxRetries),
            Some(value) => Some(
                u32::try_from(value)
                    .map_err(|_| ValidationError::MaxRetriesTooLarge { max: u32::MAX })?,
            ),
            None => None,
        };
        let priority = self.optional_i64("priority")?.unwrap_or(0);

        Ok(NewJob {
            id,
            command: command.to_string(),
            max_retries,
            priority,
        })
    }

    fn required_str(&self, field: &'static str) -> Result<&str, ValidationError> {
        match self.fields.get(field) {
            None | Some(JsonValue::Null) => Err(ValidationError::MissingField(field)),
            Some(JsonValue::String(value)) => Ok(value),
            Some(_) => Err(ValidationError::WrongType {
                field,
                expected: "string",
            }),
        }
    }

    fn optional_i64(&self, field: &'static str) -> Result<Option<i64>, ValidationError> {
        match self.fields.get(field) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or(ValidationError::WrongType {
                field,
                expected: "integer",
            }),
        }
    }
}
