use async_trait::async_trait;
use nodeflow_dto::dto::{
    ExecuteConfig, NodeExecution, ResumeRequest, WorkflowExecution, WorkflowStatus,
};
use nodeflow_engine::ExecutionStream;
use serde_json::{Map, Value};

use crate::error::ExecResult;

pub mod executable;
pub use executable::ExecutableSvc;

/// What a cancel request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Nothing to do, the run had already finished with this status.
    AlreadyTerminal(WorkflowStatus),
    /// The interrupted run was cancelled right away.
    Cancelled,
    /// The running engine was asked to stop and will record the outcome itself.
    SignalSent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeExecutionView {
    pub node: NodeExecution,
    /// Merged inner execution of a node-debugged batch node.
    pub inner: Option<NodeExecution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatestExecution {
    pub execute_id: i64,
    pub view: NodeExecutionView,
}

#[async_trait]
pub trait ExecutableService: Send + Sync + 'static {
    /// Runs to completion and returns the final record.
    async fn sync_execute(
        &self,
        config: ExecuteConfig,
        input: Map<String, Value>,
    ) -> ExecResult<WorkflowExecution>;

    async fn async_execute(&self, config: ExecuteConfig, input: Map<String, Value>)
        -> ExecResult<i64>;

    /// Debugs a single node of the workflow.
    async fn async_execute_node(
        &self,
        config: ExecuteConfig,
        node_id: &str,
        input: Map<String, Value>,
    ) -> ExecResult<i64>;

    async fn stream_execute(
        &self,
        config: ExecuteConfig,
        input: Map<String, Value>,
    ) -> ExecResult<ExecutionStream>;

    async fn async_resume(&self, req: ResumeRequest) -> ExecResult<()>;

    async fn stream_resume(&self, req: ResumeRequest) -> ExecResult<ExecutionStream>;

    async fn cancel(
        &self,
        execute_id: i64,
        workflow_id: i64,
        space_id: i64,
    ) -> ExecResult<CancelOutcome>;

    async fn get_execution(&self, execute_id: i64, include_nodes: bool)
        -> ExecResult<WorkflowExecution>;

    async fn get_node_execution(
        &self,
        execute_id: i64,
        node_id: &str,
    ) -> ExecResult<NodeExecutionView>;

    async fn get_latest_test_run_input(&self, workflow_id: i64, user_id: i64)
        -> Option<LatestExecution>;

    async fn get_latest_node_debug_input(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
    ) -> Option<LatestExecution>;
}
