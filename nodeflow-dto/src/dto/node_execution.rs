use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::execution::TokenUsage;
use super::node_meta::NodeType;
use super::status::{ErrorLevel, NodeStatus};

/// Opaque per-node metadata, persisted as a JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_sub_execute_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_execute_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub response_extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: i64,
    pub execute_id: i64,
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub raw_output: Option<String>,
    pub error_info: Option<String>,
    pub error_level: Option<ErrorLevel>,
    pub token_usage: Option<TokenUsage>,
    /// Position inside a composite (loop / batch) parent.
    pub index: i32,
    pub items: Option<String>,
    pub parent_node_id: Option<String>,
    pub sub_execution_id: Option<i64>,
    pub extra: Option<NodeExtra>,

    /// Per-index children, filled only on merged composite results. Holes are `None`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexed_executions: Vec<Option<NodeExecution>>,
}

impl NodeExecution {
    pub fn new_running(
        id: i64,
        execute_id: i64,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        node_type: NodeType,
    ) -> Self {
        Self {
            id,
            execute_id,
            node_id: node_id.into(),
            node_name: node_name.into(),
            node_type,
            status: NodeStatus::Running,
            created_at: Utc::now(),
            updated_at: None,
            duration_ms: 0,
            input: None,
            output: None,
            raw_output: None,
            error_info: None,
            error_level: None,
            token_usage: None,
            index: 0,
            items: None,
            parent_node_id: None,
            sub_execution_id: None,
            extra: None,
            indexed_executions: Vec::new(),
        }
    }
}
