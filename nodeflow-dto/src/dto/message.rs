use serde::{Deserialize, Serialize};

use super::engine_event::EngineFailure;
use super::execution::TokenUsage;
use super::interrupt::InterruptEvent;
use super::node_meta::NodeType;
use super::status::WorkflowStatus;

/// Messages delivered to a streaming caller, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    State(StateMessage),
    Data(DataMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMessage {
    pub execute_id: i64,
    pub event_id: Option<i64>,
    pub space_id: i64,
    pub status: WorkflowStatus,
    pub usage: Option<TokenUsage>,
    pub interrupt_event: Option<InterruptEvent>,
    pub last_error: Option<EngineFailure>,
}

impl StateMessage {
    pub fn new(execute_id: i64, status: WorkflowStatus) -> Self {
        Self {
            execute_id,
            event_id: None,
            space_id: 0,
            status,
            usage: None,
            interrupt_event: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    pub execute_id: i64,
    pub node_id: String,
    pub node_type: NodeType,
    pub node_title: String,
    pub content: String,
    /// `true` on the final chunk for this node.
    pub last: bool,
    pub usage: Option<TokenUsage>,
}

impl StreamMessage {
    pub fn status(&self) -> Option<WorkflowStatus> {
        match self {
            StreamMessage::State(s) => Some(s.status),
            StreamMessage::Data(_) => None,
        }
    }
}
