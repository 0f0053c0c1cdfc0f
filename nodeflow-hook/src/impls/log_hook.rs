use std::sync::Arc;

use async_trait::async_trait;
use nodeflow_dto::dto::{ExecutionEvent, ExecutionEventKind};
use tracing::{debug, info, warn};

use crate::ExecutionEventHandler;

pub struct LogHook;

impl LogHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl ExecutionEventHandler for LogHook {
    async fn handle_event(&self, event: &ExecutionEvent) {
        let execute_id = event.ctx.execute_id();
        let node_key = event
            .ctx
            .node
            .as_ref()
            .map(|n| n.node_key.as_str())
            .unwrap_or("-");

        match &event.kind {
            ExecutionEventKind::NodeStreamingOutput { .. } => {
                debug!(execute_id, node_key, "[LogHook] node_streaming_output");
            }
            ExecutionEventKind::WorkflowFailed { error, .. }
            | ExecutionEventKind::NodeError { error, .. } => {
                warn!(
                    execute_id,
                    node_key,
                    code = %error.code,
                    message = %error.message,
                    "[LogHook] {}",
                    event.kind.name()
                );
            }
            ExecutionEventKind::WorkflowInterrupt { events } => {
                info!(
                    execute_id,
                    interrupt_count = events.len(),
                    "[LogHook] workflow_interrupt"
                );
            }
            kind => {
                info!(execute_id, node_key, "[LogHook] {}", kind.name());
            }
        }
    }
}
