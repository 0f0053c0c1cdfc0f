//! Seams to the collaborators the engine does not own: workflow definitions,
//! graph compilation, graph execution and id allocation.

use std::sync::Arc;

use async_trait::async_trait;
use nodeflow_dto::dto::{TerminatePlan, WorkflowBasic, WorkflowLocator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RunContext;
use crate::error::EngineError;

/// Which snapshot of a workflow to load.
#[derive(Debug, Clone, PartialEq)]
pub struct GetPolicy {
    pub workflow_id: i64,
    pub locator: WorkflowLocator,
    pub version: String,
    /// Pins the exact draft snapshot; empty means the current one.
    pub commit_id: String,
}

impl GetPolicy {
    pub fn draft(workflow_id: i64) -> Self {
        Self {
            workflow_id,
            locator: WorkflowLocator::Draft,
            version: String::new(),
            commit_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowEntity {
    pub basic: WorkflowBasic,
    pub app_id: Option<i64>,
    /// Serialized graph definition handed to the compiler.
    pub canvas: String,
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn get(&self, policy: &GetPolicy) -> Result<WorkflowEntity, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// One declared input parameter of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    pub kind: InputKind,
    #[serde(default)]
    pub required: bool,
}

/// A compiled, runnable node graph.
///
/// `run` reports everything through the events channel of `ctx` and returns
/// once the run reaches a terminal or interrupted state. Dropping `ctx` ends
/// the event stream.
#[async_trait]
pub trait ExecutableGraph: Send + Sync {
    fn node_count(&self) -> i32;

    fn inputs(&self) -> &[InputField];

    fn terminate_plan(&self) -> TerminatePlan;

    async fn run(&self, input: Map<String, Value>, ctx: RunContext);
}

#[async_trait]
pub trait GraphCompiler: Send + Sync {
    /// `entry_node` restricts the graph to a single node for node debugging.
    async fn compile(
        &self,
        workflow: &WorkflowEntity,
        entry_node: Option<&str>,
    ) -> Result<Arc<dyn ExecutableGraph>, EngineError>;
}

#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn gen_id(&self) -> Result<i64, EngineError>;

    async fn gen_multi_ids(&self, count: usize) -> Result<Vec<i64>, EngineError>;
}
