#![forbid(unsafe_code)]

use qc_core::JobState;

pub const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobsListRequest {
    pub state: Option<JobState>,
    pub limit: usize,
}

impl Default for JobsListRequest {
    fn default() -> Self {
        Self {
            state: None,
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DlqListRequest {
    pub limit: usize,
}

impl Default for DlqListRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}
