use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::interrupt::InterruptEvent;
use super::node_execution::NodeExecution;
use super::status::{ExecuteMode, SyncPattern, WorkflowLocator, WorkflowStatus};

/// Error code written when a user cancels a run.
pub const ERR_WORKFLOW_CANCELED_BY_USER: &str = "777777777";
/// Error code for unclassified engine failures.
pub const ERR_WORKFLOW_EXECUTE_FAIL: &str = "720701013";
pub const CANCEL_BY_USER_REASON: &str = "workflow cancel by user";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// How a run was requested: which workflow snapshot, by whom, in which mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteConfig {
    pub workflow_id: i64,
    pub from: WorkflowLocator,
    pub version: String,
    pub commit_id: String,
    pub operator_id: i64,
    pub mode: ExecuteMode,
    pub sync_pattern: Option<SyncPattern>,
    pub app_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub connector_id: i64,
    pub connector_uid: String,
    #[serde(default)]
    pub input_fail_fast: bool,
    #[serde(default)]
    pub cancellable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: i64,
    pub workflow_id: i64,
    /// Published version; empty for draft runs.
    pub version: String,
    pub space_id: i64,
    pub config: ExecuteConfig,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error_code: Option<String>,
    pub fail_reason: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub node_count: i32,
    pub commit_id: String,
    pub log_id: String,
    pub parent_node_id: Option<String>,
    pub parent_node_execute_id: Option<i64>,
    pub root_execution_id: i64,
    /// Resume-lock token: the interrupt event currently being resumed.
    pub current_resuming_event_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interrupt_events: Vec<InterruptEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_executions: Vec<NodeExecution>,
}

impl WorkflowExecution {
    /// A fresh Running record for a top-level run.
    pub fn new_root(id: i64, workflow_id: i64, space_id: i64, config: ExecuteConfig) -> Self {
        Self {
            id,
            workflow_id,
            version: config.version.clone(),
            space_id,
            commit_id: config.commit_id.clone(),
            config,
            status: WorkflowStatus::Running,
            created_at: Utc::now(),
            updated_at: None,
            duration_ms: 0,
            input: None,
            output: None,
            error_code: None,
            fail_reason: None,
            token_usage: None,
            node_count: 0,
            log_id: String::new(),
            parent_node_id: None,
            parent_node_execute_id: None,
            root_execution_id: id,
            current_resuming_event_id: None,
            interrupt_events: Vec::new(),
            node_executions: Vec::new(),
        }
    }

    /// Placeholder returned while a just-created record is not yet readable.
    pub fn transient_running(id: i64) -> Self {
        Self::new_root(id, 0, 0, ExecuteConfig::default())
    }

    pub fn is_root(&self) -> bool {
        self.id == self.root_execution_id
    }
}
