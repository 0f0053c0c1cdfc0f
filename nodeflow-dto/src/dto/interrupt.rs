use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node_meta::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptEventType {
    /// A question node waiting for the user's answer.
    Question,
    /// An input-receiver node waiting for structured input.
    Input,
    /// A tool call (inside an LLM node) that itself interrupted.
    ToolCall,
}

/// A recorded pause point. Events for one execution form a FIFO queue; only the head is resumable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptEvent {
    pub id: i64,
    pub node_key: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub node_title: String,
    #[serde(default)]
    pub node_icon: String,
    /// Serialized payload shown to the user (e.g. the question messages).
    pub interrupt_data: String,
    pub event_type: InterruptEventType,
    /// Node keys from the root graph down to the interrupting node.
    #[serde(default)]
    pub node_path: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nested_interrupt_info: BTreeMap<i32, NestedInterruptInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow_interrupt_info: Option<Box<NestedInterruptInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_interrupt_event: Option<Box<ToolInterruptEvent>>,
}

impl InterruptEvent {
    pub fn new(
        id: i64,
        node_key: impl Into<String>,
        node_type: NodeType,
        event_type: InterruptEventType,
        interrupt_data: impl Into<String>,
    ) -> Self {
        let node_key = node_key.into();
        Self {
            id,
            node_path: vec![node_key.clone()],
            node_key,
            node_type,
            node_title: String::new(),
            node_icon: String::new(),
            interrupt_data: interrupt_data.into(),
            event_type,
            nested_interrupt_info: BTreeMap::new(),
            sub_workflow_interrupt_info: None,
            tool_interrupt_event: None,
        }
    }

    /// The event carrying the question content: the wrapped event for tool-call interrupts.
    pub fn question_mut(&mut self) -> Option<&mut InterruptEvent> {
        match self.event_type {
            InterruptEventType::Question => Some(self),
            InterruptEventType::ToolCall => self
                .tool_interrupt_event
                .as_deref_mut()
                .map(|t| &mut t.event)
                .filter(|e| e.event_type == InterruptEventType::Question),
            InterruptEventType::Input => None,
        }
    }
}

/// Interrupt state of a composite node's inner body or a sub-workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedInterruptInfo {
    #[serde(default)]
    pub interrupt_nodes: Vec<String>,
    #[serde(default)]
    pub events: Vec<InterruptEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInterruptEvent {
    pub tool_call_id: String,
    pub tool_name: String,
    pub execute_id: i64,
    pub event: InterruptEvent,
}

/// Identity is `(execute_id, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub execute_id: i64,
    pub event_id: i64,
    pub resume_data: String,
}
