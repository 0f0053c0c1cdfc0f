use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowExecutionRow {
    pub id: i64,
    pub workflow_id: i64,
    pub version: String,
    pub space_id: i64,
    pub mode: i64,
    pub operator_id: i64,
    pub connector_id: i64,
    pub connector_uid: String,
    pub app_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub sync_pattern: i64,
    pub input_fail_fast: bool,
    pub cancellable: bool,
    pub status: i64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub error_code: Option<String>,
    pub fail_reason: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub duration: i64,
    pub node_count: i64,
    pub commit_id: String,
    pub log_id: String,
    pub parent_node_id: Option<String>,
    pub parent_node_execute_id: Option<i64>,
    pub root_execution_id: i64,
    pub resume_event_id: i64,
    /// Unix milliseconds.
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Columns rewritten by a conditional status update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusTransitionRow {
    pub status: i64,
    pub output: String,
    pub duration: i64,
    pub error_code: String,
    pub fail_reason: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub resume_event_id: i64,
    pub updated_at: i64,
}
