#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nodeflow_common::{CacheBackend, NodeflowConfig};
use nodeflow_core::builder::{build_app_state, build_memory_state, Collaborators};
use nodeflow_core::{ExecutableService, ExecutableSvc};
use nodeflow_dto::dto::{
    ExecuteConfig, ExecuteMode, WorkflowBasic, WorkflowExecution, WorkflowStatus,
};
use nodeflow_engine::scripted::scripted_workflow;
use nodeflow_engine::{ScriptedCompiler, StaticWorkflowRepository};
use serde_json::{json, Map, Value};

pub const WORKFLOW_ID: i64 = 1;
pub const SPACE_ID: i64 = 10;
pub const USER_ID: i64 = 100;

pub const QUESTION: &str =
    r#"{"messages":[{"type":"question","content_type":"text","content":"Which color?","id":"qa_1_0"}]}"#;

fn collaborators(canvas: Value) -> Collaborators {
    let repository = Arc::new(StaticWorkflowRepository::new());
    repository.insert(scripted_workflow(
        WorkflowBasic {
            id: WORKFLOW_ID,
            space_id: SPACE_ID,
            version: String::new(),
            commit_id: "draft_1".into(),
        },
        &canvas,
    ));
    Collaborators {
        repository,
        compiler: Arc::new(ScriptedCompiler),
        ids: None,
    }
}

fn node_config() -> NodeflowConfig {
    NodeflowConfig {
        cache_backend: CacheBackend::Memory,
        cancel_check_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Records and cache both in process memory.
pub fn service(canvas: Value) -> ExecutableSvc {
    let state = build_memory_state(&node_config(), collaborators(canvas));
    ExecutableSvc::new(Arc::new(state))
}

/// Records in an in-memory SQLite database, cache in process memory.
pub async fn sqlite_service(canvas: Value) -> ExecutableSvc {
    let config = NodeflowConfig {
        db_url: "sqlite::memory:".into(),
        max_db_connections: 1,
        ..node_config()
    };
    let state = build_app_state(&config, collaborators(canvas)).await.unwrap();
    ExecutableSvc::new(Arc::new(state))
}

pub fn config() -> ExecuteConfig {
    ExecuteConfig {
        workflow_id: WORKFLOW_ID,
        operator_id: USER_ID,
        mode: ExecuteMode::Debug,
        ..Default::default()
    }
}

pub fn input(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("query".into(), json!(query));
    map
}

pub async fn wait_for_status(
    svc: &ExecutableSvc,
    execute_id: i64,
    status: WorkflowStatus,
) -> WorkflowExecution {
    for _ in 0..300 {
        let exe = svc.get_execution(execute_id, false).await.unwrap();
        if exe.status == status {
            return exe;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} never reached {}", execute_id, status);
}

/// Interrupted status lands before the event is queued; wait for both.
pub async fn wait_for_interrupt(svc: &ExecutableSvc, execute_id: i64) -> WorkflowExecution {
    for _ in 0..300 {
        let exe = svc.get_execution(execute_id, false).await.unwrap();
        if exe.status == WorkflowStatus::Interrupted && !exe.interrupt_events.is_empty() {
            return exe;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {} never got an interrupt event", execute_id);
}

pub async fn wait_for_node(svc: &ExecutableSvc, execute_id: i64, node_id: &str) {
    for _ in 0..300 {
        let exe = svc.get_execution(execute_id, true).await.unwrap();
        if exe.node_executions.iter().any(|n| n.node_id == node_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("node {} of execution {} never started", node_id, execute_id);
}

pub fn linear_canvas() -> Value {
    json!({
        "inputs": [{"name": "query", "kind": "string", "required": true}],
        "steps": [
            {"type": "node", "key": "llm_1", "node_type": "LLM",
             "output": {"text": "hello"}, "tokens": {"input_tokens": 3, "output_tokens": 5}}
        ]
    })
}

pub fn question_canvas() -> Value {
    json!({
        "steps": [
            {"type": "interrupt", "key": "qa_1", "data": QUESTION},
            {"type": "node", "key": "after", "output": {"done": true}}
        ]
    })
}

pub fn slow_canvas() -> Value {
    json!({
        "steps": [
            {"type": "wait", "key": "slow", "millis": 30000},
            {"type": "node", "key": "never", "output": {}}
        ]
    })
}

/// Asks a question, then sits in a long wait before finishing.
pub fn question_then_wait_canvas() -> Value {
    json!({
        "steps": [
            {"type": "interrupt", "key": "qa_1", "data": QUESTION},
            {"type": "wait", "key": "slow", "millis": 30000},
            {"type": "node", "key": "never", "output": {}}
        ]
    })
}
