use std::sync::Arc;

use nodeflow_dto::dto::{
    EventContext, ExecuteConfig, ExecutionEvent, ExecutionEventKind, InterruptEvent, NodeContext,
    SubWorkflowContext, WorkflowBasic,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::traits::IdGenerator;

/// The interrupt event being resumed and the caller's answer to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeContext {
    pub event: InterruptEvent,
    pub data: String,
}

/// Everything a graph needs while it runs: identity, the resume payload,
/// the cooperative cancellation token and the channel events are reported on.
#[derive(Clone)]
pub struct RunContext {
    pub root_execute_id: i64,
    pub workflow: WorkflowBasic,
    pub config: ExecuteConfig,
    pub resume: Option<ResumeContext>,
    pub cancel: CancellationToken,
    pub ids: Arc<dyn IdGenerator>,
    events: mpsc::Sender<ExecutionEvent>,
}

impl RunContext {
    pub fn new(
        root_execute_id: i64,
        workflow: WorkflowBasic,
        config: ExecuteConfig,
        resume: Option<ResumeContext>,
        ids: Arc<dyn IdGenerator>,
        events: mpsc::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            root_execute_id,
            workflow,
            config,
            resume,
            cancel: CancellationToken::new(),
            ids,
            events,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn resume_event(&self) -> Option<&InterruptEvent> {
        self.resume.as_ref().map(|r| &r.event)
    }

    pub fn event_context(
        &self,
        sub: Option<SubWorkflowContext>,
        node: Option<NodeContext>,
    ) -> EventContext {
        EventContext {
            root_execute_id: self.root_execute_id,
            root_workflow: self.workflow.clone(),
            config: self.config.clone(),
            sub,
            node,
            resume_event: self.resume_event().cloned(),
        }
    }

    /// Report an event for the root workflow.
    pub async fn emit(
        &self,
        node: Option<NodeContext>,
        kind: ExecutionEventKind,
    ) -> Result<(), EngineError> {
        self.emit_in(None, node, kind).await
    }

    pub async fn emit_in(
        &self,
        sub: Option<SubWorkflowContext>,
        node: Option<NodeContext>,
        kind: ExecutionEventKind,
    ) -> Result<(), EngineError> {
        let event = ExecutionEvent::new(self.event_context(sub, node), kind);
        self.events
            .send(event)
            .await
            .map_err(|_| EngineError::EventLoopClosed(self.root_execute_id))
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("root_execute_id", &self.root_execute_id)
            .field("workflow", &self.workflow)
            .field("resume", &self.resume)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
