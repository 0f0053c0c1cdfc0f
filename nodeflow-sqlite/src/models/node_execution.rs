use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeExecutionRow {
    pub id: i64,
    pub execute_id: i64,
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub status: i64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub raw_output: Option<String>,
    pub error_info: Option<String>,
    pub error_level: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub duration: i64,
    pub composite_node_index: i64,
    pub composite_node_items: Option<String>,
    pub parent_node_id: Option<String>,
    pub sub_execute_id: Option<i64>,
    /// Serialized `NodeExtra`.
    pub extra: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateNodeExecutionRow {
    pub status: Option<i64>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub raw_output: Option<String>,
    pub error_info: Option<String>,
    pub error_level: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub duration: Option<i64>,
    pub sub_execute_id: Option<i64>,
    pub extra: Option<String>,
    pub updated_at: Option<i64>,
}
