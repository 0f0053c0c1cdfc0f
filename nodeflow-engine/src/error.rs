use nodeflow_dto::dto::WorkflowStatus;
use nodeflow_storage::error::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("failed to compile workflow: {0}")]
    Compile(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("interrupt event {event_id} does not exist for execution {execute_id}")]
    InterruptEventNotFound { execute_id: i64, event_id: i64 },

    #[error("interrupt event id mismatch, expect: {expected}, actual: {actual}")]
    InterruptEventMismatch { expected: i64, actual: i64 },

    #[error("workflow execution {execute_id} lock failed, current status is {current}")]
    ResumeLockFailed {
        execute_id: i64,
        current: WorkflowStatus,
    },

    #[error("failed to update workflow execution {execute_id} to {target}, current status is {current:?}")]
    UnexpectedStatus {
        execute_id: i64,
        target: WorkflowStatus,
        current: Option<WorkflowStatus>,
    },

    #[error("malformed event: {0}")]
    InvalidEvent(String),

    #[error("failed to append resume data: {0}")]
    ResumeData(String),

    #[error("id generation failed: {0}")]
    IdGeneration(String),

    #[error("event loop of execution {0} has stopped")]
    EventLoopClosed(i64),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// The execution's real status when the error stems from a state conflict.
    pub fn current_status(&self) -> Option<WorkflowStatus> {
        match self {
            EngineError::ResumeLockFailed { current, .. } => Some(*current),
            EngineError::UnexpectedStatus { current, .. } => *current,
            _ => None,
        }
    }
}
