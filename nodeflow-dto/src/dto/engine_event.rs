//! Events the graph engine reports while a run proceeds.

use serde::{Deserialize, Serialize};

use super::execution::{
    ExecuteConfig, TokenUsage, CANCEL_BY_USER_REASON, ERR_WORKFLOW_CANCELED_BY_USER,
};
use super::interrupt::InterruptEvent;
use super::node_execution::NodeExtra;
use super::node_meta::NodeType;
use super::status::ErrorLevel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBasic {
    pub id: i64,
    pub space_id: i64,
    pub version: String,
    pub commit_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubWorkflowContext {
    pub sub_execute_id: i64,
    pub workflow: WorkflowBasic,
}

/// How the Exit node delivers its result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatePlan {
    #[default]
    ReturnVariables,
    UseAnswerContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchInfo {
    pub index: i32,
    pub items: String,
    pub composite_node_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeContext {
    pub node_key: String,
    pub node_execute_id: i64,
    pub node_name: String,
    pub node_type: NodeType,
    pub node_path: Vec<String>,
    /// Set when this node is the one resuming an interrupt event.
    pub resuming_event: Option<InterruptEvent>,
    pub sub_execute_id: Option<i64>,
    pub batch: Option<BatchInfo>,
    pub terminate_plan: Option<TerminatePlan>,
}

impl NodeContext {
    pub fn new(node_key: impl Into<String>, node_execute_id: i64, node_type: NodeType) -> Self {
        let node_key = node_key.into();
        Self {
            node_name: node_key.clone(),
            node_path: vec![node_key.clone()],
            node_key,
            node_execute_id,
            node_type,
            resuming_event: None,
            sub_execute_id: None,
            batch: None,
            terminate_plan: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub root_execute_id: i64,
    pub root_workflow: WorkflowBasic,
    pub config: ExecuteConfig,
    /// Present when the event comes from inside a sub-workflow.
    pub sub: Option<SubWorkflowContext>,
    /// The node the event belongs to. For a sub-workflow start it is the parent node.
    pub node: Option<NodeContext>,
    pub resume_event: Option<InterruptEvent>,
}

impl EventContext {
    /// The execution record this event applies to.
    pub fn execute_id(&self) -> i64 {
        self.sub
            .as_ref()
            .map(|s| s.sub_execute_id)
            .unwrap_or(self.root_execute_id)
    }

    pub fn is_root(&self) -> bool {
        self.sub.is_none()
    }

    pub fn resumed_event_id(&self) -> Option<i64> {
        self.resume_event.as_ref().map(|e| e.id)
    }
}

/// A failure reported by the engine or a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineFailure {
    pub code: String,
    pub message: String,
    pub level: ErrorLevel,
}

impl EngineFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            level: ErrorLevel::Error,
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ErrorLevel::Warn,
            ..Self::new(code, message)
        }
    }

    pub fn cancelled() -> Self {
        Self {
            code: ERR_WORKFLOW_CANCELED_BY_USER.to_string(),
            message: CANCEL_BY_USER_REASON.to_string(),
            level: ErrorLevel::Cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEventKind {
    WorkflowStart {
        input: String,
        node_count: i32,
    },
    WorkflowSuccess {
        output: String,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    },
    WorkflowFailed {
        error: EngineFailure,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    },
    WorkflowInterrupt {
        events: Vec<InterruptEvent>,
    },
    WorkflowCancel {
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    },
    WorkflowResume,
    NodeStart {
        input: String,
        extra: Option<NodeExtra>,
    },
    NodeEnd {
        output: String,
        raw_output: Option<String>,
        input: Option<String>,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
        warning: Option<EngineFailure>,
        answer: String,
        extra: Option<NodeExtra>,
    },
    NodeStreamingOutput {
        output: String,
        answer: String,
        stream_end: bool,
    },
    NodeError {
        error: EngineFailure,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    },
}

impl ExecutionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEventKind::WorkflowStart { .. } => "workflow_start",
            ExecutionEventKind::WorkflowSuccess { .. } => "workflow_success",
            ExecutionEventKind::WorkflowFailed { .. } => "workflow_failed",
            ExecutionEventKind::WorkflowInterrupt { .. } => "workflow_interrupt",
            ExecutionEventKind::WorkflowCancel { .. } => "workflow_cancel",
            ExecutionEventKind::WorkflowResume => "workflow_resume",
            ExecutionEventKind::NodeStart { .. } => "node_start",
            ExecutionEventKind::NodeEnd { .. } => "node_end",
            ExecutionEventKind::NodeStreamingOutput { .. } => "node_streaming_output",
            ExecutionEventKind::NodeError { .. } => "node_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionEvent {
    pub ctx: EventContext,
    pub kind: ExecutionEventKind,
}

impl ExecutionEvent {
    pub fn new(ctx: EventContext, kind: ExecutionEventKind) -> Self {
        Self { ctx, kind }
    }
}
