use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use nodeflow_dto::dto::{
    ErrorLevel, NodeExecution, NodeStatus, WorkflowExecution, WorkflowStatus,
    CANCEL_BY_USER_REASON, ERR_WORKFLOW_CANCELED_BY_USER,
};
use nodeflow_storage::entities::{ExecutionUpdate, NodeExecutionUpdate, UpdateOutcome};
use nodeflow_storage::error::StorageError;
use nodeflow_storage::streaming::overlay_streaming_output;
use nodeflow_storage::traits::{ExecutionRecordStore, NodeOutputCache};

use crate::crud::{node_execution_crud, workflow_execution_crud};
use crate::persistence::mapping;
use crate::tx_exec;

/// SQLite-backed execution records. Streaming node output lives in `output_cache`.
#[derive(Clone)]
pub struct SqliteExecutionStore {
    pool: SqlitePool,
    output_cache: Arc<dyn NodeOutputCache>,
}

impl SqliteExecutionStore {
    pub fn new(pool: SqlitePool, output_cache: Arc<dyn NodeOutputCache>) -> Self {
        Self { pool, output_cache }
    }

    async fn outcome_after_miss(&self, id: i64) -> Result<UpdateOutcome, StorageError> {
        match workflow_execution_crud::get_status(&self.pool, id).await? {
            Some(code) => Ok(UpdateOutcome::Conflict {
                current: mapping::workflow_status(code)?,
            }),
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn with_streaming_output(
        &self,
        rows: Vec<crate::models::node_execution::NodeExecutionRow>,
    ) -> Result<Vec<NodeExecution>, StorageError> {
        let mut nodes = rows
            .into_iter()
            .map(mapping::to_node)
            .collect::<Result<Vec<_>, _>>()?;
        overlay_streaming_output(self.output_cache.as_ref(), &mut nodes).await;
        Ok(nodes)
    }
}

#[async_trait]
impl ExecutionRecordStore for SqliteExecutionStore {
    async fn create_execution(&self, exec: &WorkflowExecution) -> Result<(), StorageError> {
        let row = mapping::to_execution_row(exec);
        use node_execution_crud::set_sub_execute_id;
        use workflow_execution_crud::create_execution;

        match exec.parent_node_execute_id {
            None => create_execution(&self.pool, &row).await?,
            Some(parent_id) => {
                let mut tx = self.pool.begin().await?;
                tx_exec!(tx, create_execution(&row))?;
                let linked = tx_exec!(tx, set_sub_execute_id(parent_id, exec.id))?;
                if linked == 0 {
                    tx.rollback().await?;
                    return Err(StorageError::NotFound(format!(
                        "parent node execution {}",
                        parent_id
                    )));
                }
                tx.commit().await?;
            }
        }
        debug!(execute_id = exec.id, root = exec.root_execution_id, "workflow execution created");
        Ok(())
    }

    async fn update_on_status(
        &self,
        id: i64,
        update: &ExecutionUpdate,
        allowed: &[WorkflowStatus],
    ) -> Result<UpdateOutcome, StorageError> {
        let changes = mapping::to_transition_row(update, Utc::now());
        let allowed: Vec<i64> = allowed.iter().map(|s| s.code() as i64).collect();
        let rows =
            workflow_execution_crud::update_on_status(&self.pool, id, &changes, &allowed).await?;
        if rows > 0 {
            return Ok(UpdateOutcome::Applied { rows });
        }
        self.outcome_after_miss(id).await
    }

    async fn try_acquire_resume_lock(
        &self,
        id: i64,
        event_id: i64,
    ) -> Result<UpdateOutcome, StorageError> {
        let rows = workflow_execution_crud::acquire_resume_lock(
            &self.pool,
            id,
            event_id,
            WorkflowStatus::Running.code() as i64,
            WorkflowStatus::Interrupted.code() as i64,
            mapping::millis(Utc::now()),
        )
        .await?;
        if rows > 0 {
            return Ok(UpdateOutcome::Applied { rows });
        }
        self.outcome_after_miss(id).await
    }

    async fn get_execution(&self, id: i64) -> Result<Option<WorkflowExecution>, StorageError> {
        workflow_execution_crud::get_execution(&self.pool, id)
            .await?
            .map(mapping::to_execution)
            .transpose()
    }

    async fn cancel_all_running_nodes(&self, id: i64) -> Result<u64, StorageError> {
        use node_execution_crud::fail_running_nodes;
        use workflow_execution_crud::cancel_live_executions;

        let now = mapping::millis(Utc::now());
        let live = [
            WorkflowStatus::Running.code() as i64,
            WorkflowStatus::Interrupted.code() as i64,
        ];

        let mut tx = self.pool.begin().await?;
        let nodes = tx_exec!(
            tx,
            fail_running_nodes(
                id,
                NodeStatus::Running.code() as i64,
                NodeStatus::Failed.code() as i64,
                CANCEL_BY_USER_REASON,
                ErrorLevel::Cancel.as_str(),
                now
            )
        )?;
        let executions = tx_exec!(
            tx,
            cancel_live_executions(
                id,
                WorkflowStatus::Cancelled.code() as i64,
                &live,
                ERR_WORKFLOW_CANCELED_BY_USER,
                CANCEL_BY_USER_REASON,
                now
            )
        )?;
        tx.commit().await?;

        info!(execute_id = id, nodes, executions, "🛑 cancelled running nodes");
        Ok(nodes + executions)
    }

    async fn create_node_execution(&self, node: &NodeExecution) -> Result<(), StorageError> {
        let row = mapping::to_node_row(node)?;
        node_execution_crud::create_node_execution(&self.pool, &row).await?;
        Ok(())
    }

    async fn update_node_execution(
        &self,
        id: i64,
        changes: &NodeExecutionUpdate,
    ) -> Result<(), StorageError> {
        if changes.is_empty() {
            return Ok(());
        }
        let row = mapping::to_node_update_row(changes, Utc::now())?;
        let rows = node_execution_crud::update_node_execution(&self.pool, id, &row).await?;
        if rows == 0 {
            return Err(StorageError::NotFound(format!("node execution {}", id)));
        }
        Ok(())
    }

    async fn update_streaming_output(&self, id: i64, output: &str) -> Result<(), StorageError> {
        self.output_cache.set_node_output(id, output).await
    }

    async fn get_node_executions(
        &self,
        execute_id: i64,
    ) -> Result<Vec<NodeExecution>, StorageError> {
        let rows = node_execution_crud::find_by_execution(&self.pool, execute_id).await?;
        self.with_streaming_output(rows).await
    }

    async fn get_node_execution(
        &self,
        execute_id: i64,
        node_id: &str,
    ) -> Result<Option<NodeExecution>, StorageError> {
        let rows: Vec<_> = node_execution_crud::find_by_node(&self.pool, execute_id, node_id)
            .await?
            .into_iter()
            .collect();
        Ok(self.with_streaming_output(rows).await?.into_iter().next())
    }

    async fn get_node_executions_by_parent(
        &self,
        execute_id: i64,
        parent_node_id: &str,
    ) -> Result<Vec<NodeExecution>, StorageError> {
        let rows =
            node_execution_crud::find_by_parent(&self.pool, execute_id, parent_node_id).await?;
        self.with_streaming_output(rows).await
    }
}
