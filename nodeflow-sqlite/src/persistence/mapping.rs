use chrono::{DateTime, TimeZone, Utc};

use nodeflow_dto::dto::{
    ErrorLevel, ExecuteConfig, ExecuteMode, NodeExecution, NodeExtra, NodeStatus, NodeType,
    SyncPattern, TokenUsage, WorkflowExecution, WorkflowLocator, WorkflowStatus,
};
use nodeflow_storage::entities::{ExecutionUpdate, NodeExecutionUpdate};
use nodeflow_storage::error::StorageError;

use crate::models::node_execution::{NodeExecutionRow, UpdateNodeExecutionRow};
use crate::models::workflow_execution::{StatusTransitionRow, WorkflowExecutionRow};

pub fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {}", ms)))
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

fn tokens(input: i64, output: i64) -> Option<TokenUsage> {
    (input != 0 || output != 0).then(|| TokenUsage::new(input, output))
}

pub fn workflow_status(code: i64) -> Result<WorkflowStatus, StorageError> {
    WorkflowStatus::from_code(code as i32)
        .ok_or_else(|| StorageError::InvalidData(format!("unknown workflow status code {}", code)))
}

pub fn node_status(code: i64) -> Result<NodeStatus, StorageError> {
    NodeStatus::from_code(code as i32)
        .ok_or_else(|| StorageError::InvalidData(format!("unknown node status code {}", code)))
}

pub fn to_execution_row(exec: &WorkflowExecution) -> WorkflowExecutionRow {
    let usage = exec.token_usage.unwrap_or_default();
    WorkflowExecutionRow {
        id: exec.id,
        workflow_id: exec.workflow_id,
        version: exec.version.clone(),
        space_id: exec.space_id,
        mode: exec.config.mode.code() as i64,
        operator_id: exec.config.operator_id,
        connector_id: exec.config.connector_id,
        connector_uid: exec.config.connector_uid.clone(),
        app_id: exec.config.app_id,
        agent_id: exec.config.agent_id,
        sync_pattern: exec.config.sync_pattern.map(|p| p.code()).unwrap_or(0) as i64,
        input_fail_fast: exec.config.input_fail_fast,
        cancellable: exec.config.cancellable,
        status: WorkflowStatus::Running.code() as i64,
        input: exec.input.clone(),
        output: exec.output.clone(),
        error_code: exec.error_code.clone(),
        fail_reason: exec.fail_reason.clone(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        duration: exec.duration_ms,
        node_count: exec.node_count as i64,
        commit_id: exec.commit_id.clone(),
        log_id: exec.log_id.clone(),
        parent_node_id: exec.parent_node_id.clone(),
        parent_node_execute_id: exec.parent_node_execute_id,
        root_execution_id: exec.root_execution_id,
        resume_event_id: 0,
        created_at: millis(exec.created_at),
        updated_at: None,
    }
}

/// Rebuilds the domain record, decoding the integer-coded config columns.
pub fn to_execution(row: WorkflowExecutionRow) -> Result<WorkflowExecution, StorageError> {
    let mode = ExecuteMode::from_code(row.mode as i32)
        .ok_or_else(|| StorageError::InvalidData(format!("unknown execute mode {}", row.mode)))?;
    let sync_pattern = SyncPattern::from_code(row.sync_pattern as i32)
        .map_err(|c| StorageError::InvalidData(format!("unknown sync pattern {}", c)))?;
    let status = workflow_status(row.status)?;

    let config = ExecuteConfig {
        workflow_id: row.workflow_id,
        from: if row.version.is_empty() {
            WorkflowLocator::Draft
        } else {
            WorkflowLocator::SpecificVersion
        },
        version: row.version.clone(),
        commit_id: row.commit_id.clone(),
        operator_id: row.operator_id,
        mode,
        sync_pattern,
        app_id: row.app_id,
        agent_id: row.agent_id,
        connector_id: row.connector_id,
        connector_uid: row.connector_uid.clone(),
        input_fail_fast: row.input_fail_fast,
        cancellable: row.cancellable,
    };

    Ok(WorkflowExecution {
        id: row.id,
        workflow_id: row.workflow_id,
        version: row.version,
        space_id: row.space_id,
        config,
        status,
        created_at: from_millis(row.created_at)?,
        updated_at: row.updated_at.map(from_millis).transpose()?,
        duration_ms: row.duration,
        input: non_blank(row.input),
        output: non_blank(row.output),
        error_code: non_blank(row.error_code),
        fail_reason: non_blank(row.fail_reason),
        token_usage: tokens(row.input_tokens, row.output_tokens),
        node_count: row.node_count as i32,
        commit_id: row.commit_id,
        log_id: row.log_id,
        parent_node_id: non_blank(row.parent_node_id),
        parent_node_execute_id: row.parent_node_execute_id,
        root_execution_id: row.root_execution_id,
        current_resuming_event_id: (row.resume_event_id != 0).then_some(row.resume_event_id),
        interrupt_events: Vec::new(),
        node_executions: Vec::new(),
    })
}

pub fn to_transition_row(update: &ExecutionUpdate, now: DateTime<Utc>) -> StatusTransitionRow {
    let usage = update.token_usage.unwrap_or_default();
    StatusTransitionRow {
        status: update.status.code() as i64,
        output: update.output.clone().unwrap_or_default(),
        duration: update.duration_ms,
        error_code: update.error_code.clone().unwrap_or_default(),
        fail_reason: update.fail_reason.clone().unwrap_or_default(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        resume_event_id: update.resume_event_id.unwrap_or(0),
        updated_at: millis(now),
    }
}

fn encode_extra(extra: &NodeExtra) -> Result<String, StorageError> {
    serde_json::to_string(extra).map_err(|e| StorageError::SerializationError(e.to_string()))
}

pub fn to_node_row(node: &NodeExecution) -> Result<NodeExecutionRow, StorageError> {
    let usage = node.token_usage.unwrap_or_default();
    Ok(NodeExecutionRow {
        id: node.id,
        execute_id: node.execute_id,
        node_id: node.node_id.clone(),
        node_name: node.node_name.clone(),
        node_type: node.node_type.as_str().to_string(),
        status: node.status.code() as i64,
        input: node.input.clone(),
        output: node.output.clone(),
        raw_output: node.raw_output.clone(),
        error_info: node.error_info.clone(),
        error_level: node.error_level.map(|l| l.as_str().to_string()),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        duration: node.duration_ms,
        composite_node_index: node.index as i64,
        composite_node_items: node.items.clone(),
        parent_node_id: node.parent_node_id.clone(),
        sub_execute_id: node.sub_execution_id,
        extra: node.extra.as_ref().map(encode_extra).transpose()?,
        created_at: millis(node.created_at),
        updated_at: None,
    })
}

pub fn to_node(row: NodeExecutionRow) -> Result<NodeExecution, StorageError> {
    let error_level = match non_blank(row.error_level) {
        Some(level) => Some(ErrorLevel::parse(&level).ok_or_else(|| {
            StorageError::InvalidData(format!("unknown error level {}", level))
        })?),
        None => None,
    };
    let extra = match non_blank(row.extra) {
        Some(raw) => Some(
            serde_json::from_str::<NodeExtra>(&raw)
                .map_err(|e| StorageError::DeserializationError(format!("node extra: {}", e)))?,
        ),
        None => None,
    };

    Ok(NodeExecution {
        id: row.id,
        execute_id: row.execute_id,
        node_id: row.node_id,
        node_name: row.node_name,
        node_type: NodeType::from(row.node_type),
        status: node_status(row.status)?,
        created_at: from_millis(row.created_at)?,
        updated_at: row.updated_at.map(from_millis).transpose()?,
        duration_ms: row.duration,
        input: non_blank(row.input),
        output: non_blank(row.output),
        raw_output: non_blank(row.raw_output),
        error_info: non_blank(row.error_info),
        error_level,
        token_usage: tokens(row.input_tokens, row.output_tokens),
        index: row.composite_node_index as i32,
        items: non_blank(row.composite_node_items),
        parent_node_id: non_blank(row.parent_node_id),
        sub_execution_id: row.sub_execute_id,
        extra,
        indexed_executions: Vec::new(),
    })
}

pub fn to_node_update_row(
    changes: &NodeExecutionUpdate,
    now: DateTime<Utc>,
) -> Result<UpdateNodeExecutionRow, StorageError> {
    Ok(UpdateNodeExecutionRow {
        status: changes.status.map(|s| s.code() as i64),
        input: changes.input.clone(),
        output: changes.output.clone(),
        raw_output: changes.raw_output.clone(),
        error_info: changes.error_info.clone(),
        error_level: changes.error_level.map(|l| l.as_str().to_string()),
        input_tokens: changes.token_usage.map(|t| t.input_tokens),
        output_tokens: changes.token_usage.map(|t| t.output_tokens),
        duration: changes.duration_ms,
        sub_execute_id: changes.sub_execution_id,
        extra: changes.extra.as_ref().map(encode_extra).transpose()?,
        updated_at: Some(millis(now)),
    })
}
