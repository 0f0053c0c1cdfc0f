mod common;

use futures::StreamExt;
use nodeflow_core::{CancelOutcome, ExecError, ExecutableService};
use nodeflow_dto::dto::{
    ErrorLevel, ExecuteConfig, ExecuteMode, NodeStatus, NodeType, ResumeRequest, StreamMessage,
    WorkflowStatus, ENTRY_NODE_KEY,
};
use serde_json::{json, Map};

use common::*;

#[tokio::test]
async fn test_sync_execute_succeeds_without_error_code() {
    let svc = service(linear_canvas());

    let exe = svc.sync_execute(config(), input("hi")).await.unwrap();
    assert_eq!(exe.status, WorkflowStatus::Success);
    assert_eq!(exe.output.as_deref(), Some(r#"{"text":"hello"}"#));
    assert_eq!(exe.error_code, None);
    assert_eq!(exe.fail_reason, None);
    assert_eq!(exe.token_usage.map(|t| t.output_tokens), Some(5));
    assert_eq!(exe.input.as_deref(), Some(r#"{"query":"hi"}"#));
    assert_eq!(exe.commit_id, "draft_1");
    assert!(!exe.log_id.is_empty());
}

#[tokio::test]
async fn test_missing_required_input_fails_fast() {
    let svc = service(linear_canvas());
    let strict = ExecuteConfig {
        input_fail_fast: true,
        ..config()
    };

    let err = svc.sync_execute(strict, Map::new()).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT");
}

#[tokio::test]
async fn test_interrupt_and_resume_round_trip() {
    let svc = service(question_canvas());

    let execute_id = svc.async_execute(config(), Map::new()).await.unwrap();
    let exe = wait_for_interrupt(&svc, execute_id).await;
    assert_eq!(exe.interrupt_events.len(), 1);
    let event = exe.interrupt_events[0].clone();
    assert_eq!(event.node_key, "qa_1");

    svc.async_resume(ResumeRequest {
        execute_id,
        event_id: event.id,
        resume_data: "blue".into(),
    })
    .await
    .unwrap();
    let resumed = svc.get_execution(execute_id, false).await.unwrap();
    assert!(matches!(
        resumed.status,
        WorkflowStatus::Running | WorkflowStatus::Success
    ));

    let done = wait_for_status(&svc, execute_id, WorkflowStatus::Success).await;
    assert_eq!(done.output.as_deref(), Some(r#"{"done":true}"#));
    assert!(done.interrupt_events.is_empty());

    let err = svc
        .async_resume(ResumeRequest {
            execute_id,
            event_id: event.id,
            resume_data: "again".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.current_status(), Some(WorkflowStatus::Success));
}

#[tokio::test]
async fn test_cancel_interrupted_execution() {
    let svc = service(question_canvas());

    let execute_id = svc.async_execute(config(), Map::new()).await.unwrap();
    wait_for_interrupt(&svc, execute_id).await;

    let outcome = svc.cancel(execute_id, WORKFLOW_ID, SPACE_ID).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Cancelled);

    let exe = svc.get_execution(execute_id, true).await.unwrap();
    assert_eq!(exe.status, WorkflowStatus::Cancelled);
    assert_eq!(exe.error_code.as_deref(), Some("777777777"));
    let qa = exe
        .node_executions
        .iter()
        .find(|n| n.node_id == "qa_1")
        .expect("question node");
    assert_eq!(qa.status, NodeStatus::Failed);
    assert_eq!(qa.error_level, Some(ErrorLevel::Cancel));

    let again = svc.cancel(execute_id, WORKFLOW_ID, SPACE_ID).await.unwrap();
    assert_eq!(again, CancelOutcome::AlreadyTerminal(WorkflowStatus::Cancelled));
}

#[tokio::test]
async fn test_cancel_running_execution_only_signals() {
    let svc = service(slow_canvas());
    let cancellable = ExecuteConfig {
        cancellable: true,
        ..config()
    };

    let execute_id = svc.async_execute(cancellable, Map::new()).await.unwrap();
    wait_for_node(&svc, execute_id, "slow").await;

    let outcome = svc.cancel(execute_id, WORKFLOW_ID, SPACE_ID).await.unwrap();
    assert_eq!(outcome, CancelOutcome::SignalSent);
    let exe = svc.get_execution(execute_id, false).await.unwrap();
    assert_eq!(exe.status, WorkflowStatus::Running);

    let exe = wait_for_status(&svc, execute_id, WorkflowStatus::Cancelled).await;
    assert_eq!(exe.fail_reason.as_deref(), Some("workflow cancel by user"));
    let nodes = svc.get_execution(execute_id, true).await.unwrap().node_executions;
    assert!(nodes.iter().all(|n| n.node_id != "never"));
}

#[tokio::test]
async fn test_cancel_rejects_foreign_workflow() {
    let svc = service(question_canvas());
    let execute_id = svc.async_execute(config(), Map::new()).await.unwrap();
    wait_for_interrupt(&svc, execute_id).await;

    let err = svc.cancel(execute_id, WORKFLOW_ID + 1, SPACE_ID).await.unwrap_err();
    assert!(matches!(err, ExecError::BadRequest(_)));
    assert!(svc.cancel(execute_id + 1, WORKFLOW_ID, SPACE_ID).await.is_err());
}

#[tokio::test]
async fn test_sub_workflow_execution_is_not_a_root() {
    let svc = service(json!({
        "steps": [
            {"type": "sub_workflow", "key": "sub_1", "workflow_id": 9, "output": {"ok": 1}},
            {"type": "node", "key": "after", "output": {}}
        ]
    }));

    let root = svc.sync_execute(config(), Map::new()).await.unwrap();
    assert_eq!(root.status, WorkflowStatus::Success);
    let parent = svc.get_node_execution(root.id, "sub_1").await.unwrap().node;
    let child_id = parent.sub_execution_id.expect("child execution id");
    let child = svc.get_execution(child_id, false).await.unwrap();
    assert_eq!(child.status, WorkflowStatus::Success);

    let err = svc
        .async_resume(ResumeRequest {
            execute_id: child_id,
            event_id: 1,
            resume_data: "x".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::NotRoot { .. }));
    assert_eq!(err.current_status(), Some(WorkflowStatus::Success));

    let err = svc.cancel(child_id, 9, SPACE_ID).await.unwrap_err();
    assert!(matches!(err, ExecError::NotRoot { .. }));
    assert_eq!(err.current_status(), Some(WorkflowStatus::Success));
}

#[tokio::test]
async fn test_unknown_execution_reads_as_running() {
    let svc = service(linear_canvas());

    let exe = svc.get_execution(424242, true).await.unwrap();
    assert_eq!(exe.id, 424242);
    assert_eq!(exe.status, WorkflowStatus::Running);
    assert!(exe.node_executions.is_empty());
}

#[tokio::test]
async fn test_stream_execute_delivers_chunks_then_success() {
    let svc = service(json!({
        "steps": [
            {"type": "stream", "key": "llm_1", "node_type": "LLM", "chunks": ["Hel", "lo"]}
        ]
    }));

    let stream = svc.stream_execute(config(), Map::new()).await.unwrap();
    let messages: Vec<StreamMessage> = stream.collect().await;

    let chunks: Vec<String> = messages
        .iter()
        .filter_map(|m| match m {
            StreamMessage::Data(d) if d.node_id == "llm_1" => Some(d.content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);

    assert_eq!(messages.first().and_then(|m| m.status()), Some(WorkflowStatus::Running));
    assert_eq!(messages.last().and_then(|m| m.status()), Some(WorkflowStatus::Success));
}

#[tokio::test]
async fn test_stream_resume_reports_interrupt_and_completion() {
    let svc = service(question_canvas());

    let first: Vec<StreamMessage> = svc
        .stream_execute(config(), Map::new())
        .await
        .unwrap()
        .collect()
        .await;
    let event = match first.last() {
        Some(StreamMessage::State(s)) => {
            assert_eq!(s.status, WorkflowStatus::Interrupted);
            s.interrupt_event.clone().expect("interrupt event")
        }
        other => panic!("expected interrupted state, got {:?}", other),
    };

    let second: Vec<StreamMessage> = svc
        .stream_resume(ResumeRequest {
            execute_id: event_execute_id(&first),
            event_id: event.id,
            resume_data: "green".into(),
        })
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(second.first().and_then(|m| m.status()), Some(WorkflowStatus::Running));
    match second.last() {
        Some(StreamMessage::State(s)) => {
            assert_eq!(s.status, WorkflowStatus::Success);
            assert_eq!(s.event_id, Some(event.id));
        }
        other => panic!("expected success state, got {:?}", other),
    }
}

fn event_execute_id(messages: &[StreamMessage]) -> i64 {
    match messages.first() {
        Some(StreamMessage::State(s)) => s.execute_id,
        Some(StreamMessage::Data(d)) => d.execute_id,
        None => panic!("empty stream"),
    }
}

#[tokio::test]
async fn test_latest_test_run_points_at_entry_input() {
    let svc = service(linear_canvas());

    assert!(svc.get_latest_test_run_input(WORKFLOW_ID, USER_ID).await.is_none());

    let execute_id = svc.async_execute(config(), input("latest")).await.unwrap();
    wait_for_status(&svc, execute_id, WorkflowStatus::Success).await;

    let latest = svc
        .get_latest_test_run_input(WORKFLOW_ID, USER_ID)
        .await
        .expect("latest test run");
    assert_eq!(latest.execute_id, execute_id);
    assert_eq!(latest.view.node.node_id, ENTRY_NODE_KEY);
    assert_eq!(latest.view.node.input.as_deref(), Some(r#"{"query":"latest"}"#));

    // release runs do not move the pointer
    let release = ExecuteConfig {
        mode: ExecuteMode::Release,
        ..config()
    };
    let other = svc.async_execute(release, input("release")).await.unwrap();
    wait_for_status(&svc, other, WorkflowStatus::Success).await;
    let latest = svc.get_latest_test_run_input(WORKFLOW_ID, USER_ID).await.unwrap();
    assert_eq!(latest.execute_id, execute_id);
}

#[tokio::test]
async fn test_node_debug_batch_returns_merged_inner_execution() {
    let svc = service(json!({
        "steps": [
            {"type": "node", "key": "before", "output": {}},
            {"type": "batch", "key": "batch_1", "inner_key": "batch_1_inner", "items": [1, 2, 3]}
        ]
    }));

    let execute_id = svc
        .async_execute_node(config(), "batch_1", Map::new())
        .await
        .unwrap();
    let exe = wait_for_status(&svc, execute_id, WorkflowStatus::Success).await;
    assert_eq!(exe.config.mode, ExecuteMode::NodeDebug);

    let view = svc.get_node_execution(execute_id, "batch_1").await.unwrap();
    assert_eq!(view.node.node_type, NodeType::Batch);
    let inner = view.inner.expect("merged inner execution");
    assert_eq!(inner.node_id, "batch_1_inner");
    assert_eq!(inner.status, NodeStatus::Success);
    assert_eq!(inner.indexed_executions.len(), 3);
    assert!(inner.indexed_executions.iter().all(|e| e.is_some()));

    let latest = svc
        .get_latest_node_debug_input(WORKFLOW_ID, "batch_1", USER_ID)
        .await
        .expect("latest node debug");
    assert_eq!(latest.execute_id, execute_id);
    assert!(latest.view.inner.is_some());
    assert!(svc
        .get_latest_node_debug_input(WORKFLOW_ID, "before", USER_ID)
        .await
        .is_none());
}
