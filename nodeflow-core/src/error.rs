use nodeflow_dto::dto::WorkflowStatus;
use nodeflow_engine::EngineError;
use nodeflow_storage::error::StorageError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(thiserror::Error, Debug)]
pub enum ExecError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("execution {execute_id} is not a root execution, current status is {current}")]
    NotRoot {
        execute_id: i64,
        current: WorkflowStatus,
    },

    #[error("execution {execute_id} is {current}: {message}")]
    StatusConflict {
        execute_id: i64,
        current: WorkflowStatus,
        message: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ExecError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecError::NotFound(_) => "NOT_FOUND",
            ExecError::BadRequest(_) => "BAD_REQUEST",
            ExecError::NotRoot { .. } => "NOT_ROOT_EXECUTION",
            ExecError::StatusConflict { .. } => "STATUS_CONFLICT",
            ExecError::Engine(e) => match e {
                EngineError::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
                EngineError::Compile(_) => "COMPILE_ERROR",
                EngineError::InvalidInput(_) => "INVALID_INPUT",
                EngineError::InterruptEventNotFound { .. }
                | EngineError::InterruptEventMismatch { .. } => "INTERRUPT_EVENT_MISMATCH",
                EngineError::ResumeLockFailed { .. } | EngineError::UnexpectedStatus { .. } => {
                    "STATUS_CONFLICT"
                }
                EngineError::ResumeData(_) => "INVALID_RESUME_DATA",
                EngineError::Storage(_) => "STORAGE_ERROR",
                _ => "ENGINE_ERROR",
            },
            ExecError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// The execution's actual status when the request lost a state race.
    pub fn current_status(&self) -> Option<WorkflowStatus> {
        match self {
            ExecError::StatusConflict { current, .. } | ExecError::NotRoot { current, .. } => {
                Some(*current)
            }
            ExecError::Engine(e) => e.current_status(),
            _ => None,
        }
    }

    /// Store I/O faults; never retried inside this crate.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecError::Storage(e) | ExecError::Engine(EngineError::Storage(e)) => e.is_io(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_status() {
        let err = ExecError::StatusConflict {
            execute_id: 1,
            current: WorkflowStatus::Success,
            message: "resume requires an interrupted execution".into(),
        };
        assert_eq!(err.code(), "STATUS_CONFLICT");
        assert_eq!(err.current_status(), Some(WorkflowStatus::Success));
        assert!(!err.is_retryable());

        let err = ExecError::NotRoot {
            execute_id: 2,
            current: WorkflowStatus::Interrupted,
        };
        assert_eq!(err.code(), "NOT_ROOT_EXECUTION");
        assert_eq!(err.current_status(), Some(WorkflowStatus::Interrupted));

        let err = ExecError::from(EngineError::ResumeLockFailed {
            execute_id: 1,
            current: WorkflowStatus::Running,
        });
        assert_eq!(err.code(), "STATUS_CONFLICT");
        assert_eq!(err.current_status(), Some(WorkflowStatus::Running));

        let err = ExecError::from(EngineError::Storage(StorageError::Cache("reset".into())));
        assert!(err.is_retryable());
        assert_eq!(err.code(), "STORAGE_ERROR");

        let err = ExecError::from(StorageError::InvalidData("status 9".into()));
        assert!(!err.is_retryable());
    }
}
