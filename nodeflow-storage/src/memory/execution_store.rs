use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use nodeflow_dto::dto::{
    ErrorLevel, NodeExecution, NodeStatus, TokenUsage, WorkflowExecution, WorkflowStatus,
    CANCEL_BY_USER_REASON, ERR_WORKFLOW_CANCELED_BY_USER,
};

use crate::entities::{ExecutionUpdate, NodeExecutionUpdate, UpdateOutcome};
use crate::error::StorageError;
use crate::streaming::overlay_streaming_output;
use crate::traits::{ExecutionRecordStore, NodeOutputCache};

#[derive(Default)]
struct Records {
    executions: HashMap<i64, WorkflowExecution>,
    nodes: BTreeMap<i64, NodeExecution>,
}

/// Execution records kept in process memory. Mirrors the SQLite store's semantics:
/// blank text reads back as absent and zero token counters as no usage.
pub struct MemoryExecutionStore {
    records: Mutex<Records>,
    output_cache: Arc<dyn NodeOutputCache>,
}

impl MemoryExecutionStore {
    pub fn new(output_cache: Arc<dyn NodeOutputCache>) -> Self {
        Self {
            records: Mutex::new(Records::default()),
            output_cache,
        }
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.clone().filter(|s| !s.is_empty())
}

fn non_zero(t: Option<TokenUsage>) -> Option<TokenUsage> {
    t.filter(|t| t.input_tokens != 0 || t.output_tokens != 0)
}

#[async_trait]
impl ExecutionRecordStore for MemoryExecutionStore {
    async fn create_execution(&self, exec: &WorkflowExecution) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        if records.executions.contains_key(&exec.id) {
            return Err(StorageError::InvalidData(format!(
                "workflow execution {} already exists",
                exec.id
            )));
        }
        if let Some(parent_id) = exec.parent_node_execute_id {
            let parent = records.nodes.get_mut(&parent_id).ok_or_else(|| {
                StorageError::NotFound(format!("parent node execution {}", parent_id))
            })?;
            parent.sub_execution_id = Some(exec.id);
        }

        let mut stored = exec.clone();
        stored.status = WorkflowStatus::Running;
        stored.current_resuming_event_id = None;
        stored.interrupt_events.clear();
        stored.node_executions.clear();
        records.executions.insert(exec.id, stored);
        Ok(())
    }

    async fn update_on_status(
        &self,
        id: i64,
        update: &ExecutionUpdate,
        allowed: &[WorkflowStatus],
    ) -> Result<UpdateOutcome, StorageError> {
        let mut records = self.records.lock().await;
        let Some(exec) = records.executions.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if !allowed.contains(&exec.status) {
            return Ok(UpdateOutcome::Conflict { current: exec.status });
        }

        exec.status = update.status;
        exec.output = non_blank(&update.output);
        exec.duration_ms = update.duration_ms;
        exec.error_code = non_blank(&update.error_code);
        exec.fail_reason = non_blank(&update.fail_reason);
        exec.token_usage = non_zero(update.token_usage);
        exec.current_resuming_event_id = update.resume_event_id.filter(|&e| e != 0);
        exec.updated_at = Some(Utc::now());
        Ok(UpdateOutcome::Applied { rows: 1 })
    }

    async fn try_acquire_resume_lock(
        &self,
        id: i64,
        event_id: i64,
    ) -> Result<UpdateOutcome, StorageError> {
        let mut records = self.records.lock().await;
        let Some(exec) = records.executions.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if exec.status != WorkflowStatus::Interrupted || exec.current_resuming_event_id.is_some() {
            return Ok(UpdateOutcome::Conflict { current: exec.status });
        }
        exec.status = WorkflowStatus::Running;
        exec.current_resuming_event_id = Some(event_id);
        exec.updated_at = Some(Utc::now());
        Ok(UpdateOutcome::Applied { rows: 1 })
    }

    async fn get_execution(&self, id: i64) -> Result<Option<WorkflowExecution>, StorageError> {
        Ok(self.records.lock().await.executions.get(&id).cloned())
    }

    async fn cancel_all_running_nodes(&self, id: i64) -> Result<u64, StorageError> {
        let mut records = self.records.lock().await;
        let family: HashSet<i64> = records
            .executions
            .values()
            .filter(|e| e.id == id || e.root_execution_id == id)
            .map(|e| e.id)
            .collect();

        let now = Utc::now();
        let mut rows = 0u64;
        for node in records
            .nodes
            .values_mut()
            .filter(|n| n.status == NodeStatus::Running && family.contains(&n.execute_id))
        {
            node.status = NodeStatus::Failed;
            node.error_info = Some(CANCEL_BY_USER_REASON.to_string());
            node.error_level = Some(ErrorLevel::Cancel);
            node.updated_at = Some(now);
            rows += 1;
        }
        for exec in records.executions.values_mut().filter(|e| {
            family.contains(&e.id)
                && matches!(e.status, WorkflowStatus::Running | WorkflowStatus::Interrupted)
        }) {
            exec.status = WorkflowStatus::Cancelled;
            exec.fail_reason = Some(CANCEL_BY_USER_REASON.to_string());
            exec.error_code = Some(ERR_WORKFLOW_CANCELED_BY_USER.to_string());
            exec.current_resuming_event_id = None;
            exec.updated_at = Some(now);
            rows += 1;
        }
        Ok(rows)
    }

    async fn create_node_execution(&self, node: &NodeExecution) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        if records.nodes.contains_key(&node.id) {
            return Err(StorageError::InvalidData(format!(
                "node execution {} already exists",
                node.id
            )));
        }
        let mut stored = node.clone();
        stored.indexed_executions.clear();
        records.nodes.insert(node.id, stored);
        Ok(())
    }

    async fn update_node_execution(
        &self,
        id: i64,
        changes: &NodeExecutionUpdate,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().await;
        let node = records
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("node execution {}", id)))?;

        if let Some(status) = changes.status {
            node.status = status;
        }
        if changes.input.is_some() {
            node.input = non_blank(&changes.input);
        }
        if changes.output.is_some() {
            node.output = non_blank(&changes.output);
        }
        if changes.raw_output.is_some() {
            node.raw_output = non_blank(&changes.raw_output);
        }
        if let Some(d) = changes.duration_ms {
            node.duration_ms = d;
        }
        if changes.error_info.is_some() {
            node.error_info = non_blank(&changes.error_info);
        }
        if changes.error_level.is_some() {
            node.error_level = changes.error_level;
        }
        if changes.token_usage.is_some() {
            node.token_usage = non_zero(changes.token_usage);
        }
        if changes.sub_execution_id.is_some() {
            node.sub_execution_id = changes.sub_execution_id;
        }
        if changes.extra.is_some() {
            node.extra = changes.extra.clone();
        }
        node.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn update_streaming_output(&self, id: i64, output: &str) -> Result<(), StorageError> {
        self.output_cache.set_node_output(id, output).await
    }

    async fn get_node_executions(
        &self,
        execute_id: i64,
    ) -> Result<Vec<NodeExecution>, StorageError> {
        let mut nodes: Vec<NodeExecution> = {
            let records = self.records.lock().await;
            records
                .nodes
                .values()
                .filter(|n| n.execute_id == execute_id)
                .cloned()
                .collect()
        };
        overlay_streaming_output(self.output_cache.as_ref(), &mut nodes).await;
        Ok(nodes)
    }

    async fn get_node_execution(
        &self,
        execute_id: i64,
        node_id: &str,
    ) -> Result<Option<NodeExecution>, StorageError> {
        let found = {
            let records = self.records.lock().await;
            records
                .nodes
                .values()
                .find(|n| n.execute_id == execute_id && n.node_id == node_id)
                .cloned()
        };
        let Some(node) = found else {
            return Ok(None);
        };
        let mut one = [node];
        overlay_streaming_output(self.output_cache.as_ref(), &mut one).await;
        let [node] = one;
        Ok(Some(node))
    }

    async fn get_node_executions_by_parent(
        &self,
        execute_id: i64,
        parent_node_id: &str,
    ) -> Result<Vec<NodeExecution>, StorageError> {
        let mut nodes: Vec<NodeExecution> = {
            let records = self.records.lock().await;
            records
                .nodes
                .values()
                .filter(|n| {
                    n.execute_id == execute_id
                        && n.parent_node_id.as_deref() == Some(parent_node_id)
                })
                .cloned()
                .collect()
        };
        overlay_streaming_output(self.output_cache.as_ref(), &mut nodes).await;
        Ok(nodes)
    }
}
