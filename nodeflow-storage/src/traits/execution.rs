use nodeflow_dto::dto::{NodeExecution, WorkflowExecution, WorkflowStatus};

use crate::entities::{ExecutionUpdate, NodeExecutionUpdate, UpdateOutcome};
use crate::error::StorageError;

/// Durable workflow and node execution records.
#[async_trait::async_trait]
pub trait ExecutionRecordStore: Send + Sync {
    /// Create a Running record. When `parent_node_execute_id` is set the parent node's
    /// sub-execution pointer is written in the same transaction.
    async fn create_execution(&self, exec: &WorkflowExecution) -> Result<(), StorageError>;

    /// Apply `update` only if the current status is one of `allowed`.
    async fn update_on_status(
        &self,
        id: i64,
        update: &ExecutionUpdate,
        allowed: &[WorkflowStatus],
    ) -> Result<UpdateOutcome, StorageError>;

    /// Interrupted with no resume in flight -> Running, recording `event_id` as the lock token.
    async fn try_acquire_resume_lock(
        &self,
        id: i64,
        event_id: i64,
    ) -> Result<UpdateOutcome, StorageError>;

    async fn get_execution(&self, id: i64) -> Result<Option<WorkflowExecution>, StorageError>;

    /// Fail every Running node of `id` and its descendants, and cancel the live executions.
    /// Returns the number of rows touched; a second call returns 0.
    async fn cancel_all_running_nodes(&self, id: i64) -> Result<u64, StorageError>;

    async fn create_node_execution(&self, node: &NodeExecution) -> Result<(), StorageError>;

    async fn update_node_execution(
        &self,
        id: i64,
        changes: &NodeExecutionUpdate,
    ) -> Result<(), StorageError>;

    /// Store the latest partial output of a streaming node in the fast cache.
    async fn update_streaming_output(&self, id: i64, output: &str) -> Result<(), StorageError>;

    async fn get_node_executions(
        &self,
        execute_id: i64,
    ) -> Result<Vec<NodeExecution>, StorageError>;

    async fn get_node_execution(
        &self,
        execute_id: i64,
        node_id: &str,
    ) -> Result<Option<NodeExecution>, StorageError>;

    async fn get_node_executions_by_parent(
        &self,
        execute_id: i64,
        parent_node_id: &str,
    ) -> Result<Vec<NodeExecution>, StorageError>;
}
