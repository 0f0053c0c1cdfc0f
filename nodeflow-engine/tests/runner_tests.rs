use std::sync::Arc;
use std::time::Duration;

use nodeflow_dto::dto::{
    ExecuteConfig, ExecutionEventKind, ResumeRequest, WorkflowBasic, WorkflowStatus,
};
use nodeflow_engine::scripted::scripted_workflow;
use nodeflow_engine::{
    EngineError, EventStores, ExecutableGraph, GraphCompiler, LocalIdGenerator, RunRequest,
    RunnerSettings, ScriptedCompiler, WorkflowRunner,
};
use nodeflow_hook::ExecutionEventDispatcher;
use nodeflow_storage::memory::{MemoryCache, MemoryExecutionStore};
use nodeflow_storage::traits::{ExecutionRecordStore, InterruptEventQueue};
use serde_json::{json, Map, Value};

const QUESTION: &str =
    r#"{"messages":[{"type":"question","content_type":"text","content":"Which?","id":"qa_1_0"}]}"#;

fn runner() -> (WorkflowRunner, EventStores) {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryExecutionStore::new(cache.clone()));
    let stores = EventStores { store, cache };
    let runner = WorkflowRunner::new(
        stores.clone(),
        Arc::new(LocalIdGenerator::new()),
        ExecutionEventDispatcher::empty(),
        RunnerSettings {
            cancel_check_interval: Duration::from_millis(20),
            event_buffer: 16,
        },
    );
    (runner, stores)
}

fn basic() -> WorkflowBasic {
    WorkflowBasic {
        id: 42,
        space_id: 5,
        version: String::new(),
        commit_id: "c1".into(),
    }
}

async fn compile(canvas: Value) -> Arc<dyn ExecutableGraph> {
    let entity = scripted_workflow(basic(), &canvas);
    ScriptedCompiler.compile(&entity, None).await.unwrap()
}

fn request(graph: &Arc<dyn ExecutableGraph>, resume: Option<ResumeRequest>) -> RunRequest {
    RunRequest {
        basic: basic(),
        config: ExecuteConfig {
            workflow_id: 42,
            commit_id: "c1".into(),
            ..Default::default()
        },
        input: "{}".into(),
        node_count: graph.node_count(),
        resume,
        stream: None,
    }
}

/// Runs the graph to its terminal event and returns the execution id.
async fn run(
    runner: &WorkflowRunner,
    graph: &Arc<dyn ExecutableGraph>,
    resume: Option<ResumeRequest>,
) -> Result<(i64, ExecutionEventKind), EngineError> {
    let prepared = runner.prepare(request(graph, resume)).await?;
    let g = graph.clone();
    let ctx = prepared.ctx;
    tokio::spawn(async move { g.run(Map::new(), ctx).await });
    let last = prepared.completion.wait().await.expect("terminal event");
    Ok((prepared.execute_id, last.kind))
}

fn interrupting_canvas() -> Value {
    json!({
        "steps": [
            {"type": "interrupt", "key": "qa_1", "data": QUESTION},
            {"type": "node", "key": "after", "output": {"done": true}}
        ]
    })
}

#[tokio::test]
async fn test_interrupt_then_resume_to_success() {
    let (runner, stores) = runner();
    let graph = compile(interrupting_canvas()).await;

    let (exe, kind) = run(&runner, &graph, None).await.unwrap();
    assert!(matches!(kind, ExecutionEventKind::WorkflowInterrupt { .. }));
    let queued = stores.cache.list_all(exe).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].node_key, "qa_1");

    let resume = ResumeRequest {
        execute_id: exe,
        event_id: queued[0].id,
        resume_data: "blue".into(),
    };
    let (_, kind) = run(&runner, &graph, Some(resume)).await.unwrap();
    assert!(matches!(kind, ExecutionEventKind::WorkflowSuccess { .. }));

    let exec = stores.store.get_execution(exe).await.unwrap().unwrap();
    assert_eq!(exec.status, WorkflowStatus::Success);
    assert_eq!(exec.output.as_deref(), Some(r#"{"done":true}"#));
    assert_eq!(exec.current_resuming_event_id, None);
    assert!(stores.cache.list_all(exe).await.unwrap().is_empty());

    let resumed = stores
        .store
        .get_node_executions(exe)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.node_id == "qa_1")
        .count();
    assert_eq!(resumed, 2);
}

#[tokio::test]
async fn test_resume_requires_matching_head_event() {
    let (runner, stores) = runner();
    let graph = compile(interrupting_canvas()).await;
    let (exe, _) = run(&runner, &graph, None).await.unwrap();
    let head = stores.cache.peek_first(exe).await.unwrap().unwrap();

    let wrong = ResumeRequest {
        execute_id: exe,
        event_id: head.id + 1,
        resume_data: "x".into(),
    };
    let err = runner.prepare(request(&graph, Some(wrong))).await.err().unwrap();
    assert!(matches!(err, EngineError::InterruptEventMismatch { .. }));

    let missing = ResumeRequest {
        execute_id: exe + 1,
        event_id: head.id,
        resume_data: "x".into(),
    };
    let err = runner.prepare(request(&graph, Some(missing))).await.err().unwrap();
    assert!(matches!(err, EngineError::InterruptEventNotFound { .. }));
}

#[tokio::test]
async fn test_second_resume_fails_with_running_status() {
    let (runner, stores) = runner();
    let graph = compile(interrupting_canvas()).await;
    let (exe, _) = run(&runner, &graph, None).await.unwrap();
    let head = stores.cache.peek_first(exe).await.unwrap().unwrap();

    // another resume already holds the lock
    let held = stores
        .store
        .try_acquire_resume_lock(exe, head.id)
        .await
        .unwrap();
    assert!(held.is_applied());

    let resume = ResumeRequest {
        execute_id: exe,
        event_id: head.id,
        resume_data: "late".into(),
    };
    let err = runner.prepare(request(&graph, Some(resume))).await.err().unwrap();
    assert_eq!(err.current_status(), Some(WorkflowStatus::Running));
    assert!(matches!(err, EngineError::ResumeLockFailed { .. }));

    // the losing resume leaves the queued question untouched
    let after = stores.cache.peek_first(exe).await.unwrap().unwrap();
    assert_eq!(after.id, head.id);
    assert_eq!(after.interrupt_data, QUESTION);
}

#[tokio::test]
async fn test_sub_workflow_creates_child_execution() {
    let (runner, stores) = runner();
    let graph = compile(json!({
        "steps": [
            {"type": "sub_workflow", "key": "sub_1", "workflow_id": 9, "output": {"y": 2}}
        ]
    }))
    .await;

    let (exe, kind) = run(&runner, &graph, None).await.unwrap();
    assert!(matches!(kind, ExecutionEventKind::WorkflowSuccess { .. }));

    let store = &stores.store;
    let parent = store.get_node_execution(exe, "sub_1").await.unwrap().unwrap();
    let child_id = parent.sub_execution_id.expect("sub execution pointer");

    let child = store.get_execution(child_id).await.unwrap().unwrap();
    assert_eq!(child.workflow_id, 9);
    assert_eq!(child.root_execution_id, exe);
    assert_eq!(child.parent_node_id.as_deref(), Some("sub_1"));
    assert_eq!(child.status, WorkflowStatus::Success);

    let root = store.get_execution(exe).await.unwrap().unwrap();
    assert_eq!(root.output.as_deref(), Some(r#"{"y":2}"#));
}
