use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a workflow execution. Success / Failed / Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Success,
    Failed,
    Cancelled,
    Interrupted,
}

impl WorkflowStatus {
    pub fn code(self) -> i32 {
        match self {
            WorkflowStatus::Running => 1,
            WorkflowStatus::Success => 2,
            WorkflowStatus::Failed => 3,
            WorkflowStatus::Cancelled => 4,
            WorkflowStatus::Interrupted => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(WorkflowStatus::Running),
            2 => Some(WorkflowStatus::Success),
            3 => Some(WorkflowStatus::Failed),
            4 => Some(WorkflowStatus::Cancelled),
            5 => Some(WorkflowStatus::Interrupted),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Success | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Success => "success",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Success,
    Failed,
}

impl NodeStatus {
    pub fn code(self) -> i32 {
        match self {
            NodeStatus::Running => 1,
            NodeStatus::Success => 2,
            NodeStatus::Failed => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(NodeStatus::Running),
            2 => Some(NodeStatus::Success),
            3 => Some(NodeStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Running => "running",
            NodeStatus::Success => "success",
            NodeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMode {
    #[default]
    Debug,
    Release,
    NodeDebug,
}

impl ExecuteMode {
    pub fn code(self) -> i32 {
        match self {
            ExecuteMode::Debug => 1,
            ExecuteMode::Release => 2,
            ExecuteMode::NodeDebug => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ExecuteMode::Debug),
            2 => Some(ExecuteMode::Release),
            3 => Some(ExecuteMode::NodeDebug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPattern {
    Sync,
    Async,
    Stream,
}

impl SyncPattern {
    pub fn code(self) -> i32 {
        match self {
            SyncPattern::Sync => 1,
            SyncPattern::Async => 2,
            SyncPattern::Stream => 3,
        }
    }

    /// `0` is the "unset" code and maps to `Ok(None)`.
    pub fn from_code(code: i32) -> Result<Option<Self>, i32> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(SyncPattern::Sync)),
            2 => Ok(Some(SyncPattern::Async)),
            3 => Ok(Some(SyncPattern::Stream)),
            other => Err(other),
        }
    }
}

/// Severity recorded on a node execution's error info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLevel {
    Warn,
    Error,
    Cancel,
}

impl ErrorLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorLevel::Warn => "warn",
            ErrorLevel::Error => "error",
            ErrorLevel::Cancel => "cancel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warn" | "warning" => Some(ErrorLevel::Warn),
            "error" => Some(ErrorLevel::Error),
            "cancel" => Some(ErrorLevel::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which snapshot of a workflow definition to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowLocator {
    #[default]
    Draft,
    SpecificVersion,
    Latest,
}
