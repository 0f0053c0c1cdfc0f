use nodeflow_dto::dto::{ErrorLevel, NodeExtra, NodeStatus, TokenUsage, WorkflowStatus};

/// Fields written by a conditional execution update.
///
/// Every update rewrites the resume token: `resume_event_id` of `None` stores 0,
/// which releases the resume lock at each transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUpdate {
    pub status: WorkflowStatus,
    pub output: Option<String>,
    pub duration_ms: i64,
    pub error_code: Option<String>,
    pub fail_reason: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub resume_event_id: Option<i64>,
}

impl ExecutionUpdate {
    pub fn status(status: WorkflowStatus) -> Self {
        Self {
            status,
            output: None,
            duration_ms: 0,
            error_code: None,
            fail_reason: None,
            token_usage: None,
            resume_event_id: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, reason: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.fail_reason = Some(reason.into());
        self
    }

    pub fn with_tokens(mut self, tokens: Option<TokenUsage>) -> Self {
        self.token_usage = tokens;
        self
    }
}

/// Partial node execution update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeExecutionUpdate {
    pub status: Option<NodeStatus>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub raw_output: Option<String>,
    pub duration_ms: Option<i64>,
    pub error_info: Option<String>,
    pub error_level: Option<ErrorLevel>,
    pub token_usage: Option<TokenUsage>,
    pub sub_execution_id: Option<i64>,
    pub extra: Option<NodeExtra>,
}

impl NodeExecutionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of a compare-and-swap on an execution's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { rows: u64 },
    /// The record exists but its status was not in the allowed set.
    Conflict { current: WorkflowStatus },
    NotFound,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied { .. })
    }

    pub fn current_status(&self) -> Option<WorkflowStatus> {
        match self {
            UpdateOutcome::Conflict { current } => Some(*current),
            _ => None,
        }
    }
}
