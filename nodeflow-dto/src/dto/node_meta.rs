use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const ENTRY_NODE_KEY: &str = "100001";
pub const EXIT_NODE_KEY: &str = "900001";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Entry,
    Exit,
    OutputEmitter,
    Llm,
    Batch,
    Loop,
    SubWorkflow,
    QuestionAnswer,
    InputReceiver,
    Plugin,
    CodeRunner,
    HttpRequester,
    Selector,
    Lambda,
    VariableAggregator,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Entry => "Entry",
            NodeType::Exit => "Exit",
            NodeType::OutputEmitter => "OutputEmitter",
            NodeType::Llm => "LLM",
            NodeType::Batch => "Batch",
            NodeType::Loop => "Loop",
            NodeType::SubWorkflow => "SubWorkflow",
            NodeType::QuestionAnswer => "QuestionAnswer",
            NodeType::InputReceiver => "InputReceiver",
            NodeType::Plugin => "Plugin",
            NodeType::CodeRunner => "CodeRunner",
            NodeType::HttpRequester => "HTTPRequester",
            NodeType::Selector => "Selector",
            NodeType::Lambda => "Lambda",
            NodeType::VariableAggregator => "VariableAggregator",
            NodeType::Other(s) => s,
        }
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Entry" => NodeType::Entry,
            "Exit" => NodeType::Exit,
            "OutputEmitter" => NodeType::OutputEmitter,
            "LLM" => NodeType::Llm,
            "Batch" => NodeType::Batch,
            "Loop" => NodeType::Loop,
            "SubWorkflow" => NodeType::SubWorkflow,
            "QuestionAnswer" => NodeType::QuestionAnswer,
            "InputReceiver" => NodeType::InputReceiver,
            "Plugin" => NodeType::Plugin,
            "CodeRunner" => NodeType::CodeRunner,
            "HTTPRequester" => NodeType::HttpRequester,
            "Selector" => NodeType::Selector,
            "Lambda" => NodeType::Lambda,
            "VariableAggregator" => NodeType::VariableAggregator,
            _ => NodeType::Other(s),
        }
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        NodeType::from(s.to_string())
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static per-type behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCapabilities {
    /// Runs an inner body per index (loop / batch).
    pub is_composite: bool,
    /// Publishes partial output while running; the cached copy is authoritative until it ends.
    pub incremental_output: bool,
    pub default_timeout_ms: Option<u64>,
}

static CAPABILITIES: Lazy<HashMap<&'static str, NodeCapabilities>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "Exit",
        NodeCapabilities { incremental_output: true, ..Default::default() },
    );
    m.insert(
        "OutputEmitter",
        NodeCapabilities { incremental_output: true, ..Default::default() },
    );
    m.insert(
        "Batch",
        NodeCapabilities { is_composite: true, ..Default::default() },
    );
    m.insert(
        "Loop",
        NodeCapabilities { is_composite: true, ..Default::default() },
    );
    m.insert(
        "LLM",
        NodeCapabilities { default_timeout_ms: Some(600_000), ..Default::default() },
    );
    m.insert(
        "CodeRunner",
        NodeCapabilities { default_timeout_ms: Some(60_000), ..Default::default() },
    );
    m.insert(
        "HTTPRequester",
        NodeCapabilities { default_timeout_ms: Some(120_000), ..Default::default() },
    );
    m
});

impl NodeType {
    pub fn capabilities(&self) -> NodeCapabilities {
        CAPABILITIES.get(self.as_str()).copied().unwrap_or_default()
    }
}
