mod common;

use nodeflow_core::{CancelOutcome, ExecError, ExecutableService};
use nodeflow_dto::dto::{ErrorLevel, ExecuteConfig, NodeStatus, ResumeRequest, WorkflowStatus};
use serde_json::{json, Map};

use common::*;

#[tokio::test]
async fn test_sqlite_interrupt_and_resume_round_trip() {
    let svc = sqlite_service(question_canvas()).await;

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

    let done = wait_for_status(&svc, execute_id, WorkflowStatus::Success).await;
    assert_eq!(done.output.as_deref(), Some(r#"{"done":true}"#));
    assert!(done.interrupt_events.is_empty());
}

#[tokio::test]
async fn test_sqlite_cancel_interrupted_execution() {
    let svc = sqlite_service(question_canvas()).await;

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
}

#[tokio::test]
async fn test_sqlite_cancel_running_execution_only_signals() {
    let svc = sqlite_service(slow_canvas()).await;
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
}

#[tokio::test]
async fn test_sqlite_resumed_run_stays_cancellable() {
    let svc = sqlite_service(question_then_wait_canvas()).await;
    let cancellable = ExecuteConfig {
        cancellable: true,
        ..config()
    };

    let execute_id = svc.async_execute(cancellable, Map::new()).await.unwrap();
    let exe = wait_for_interrupt(&svc, execute_id).await;
    assert!(exe.config.cancellable);

    svc.async_resume(ResumeRequest {
        execute_id,
        event_id: exe.interrupt_events[0].id,
        resume_data: "blue".into(),
    })
    .await
    .unwrap();
    wait_for_node(&svc, execute_id, "slow").await;

    let outcome = svc.cancel(execute_id, WORKFLOW_ID, SPACE_ID).await.unwrap();
    assert_eq!(outcome, CancelOutcome::SignalSent);

    let exe = wait_for_status(&svc, execute_id, WorkflowStatus::Cancelled).await;
    assert_eq!(exe.error_code.as_deref(), Some("777777777"));
    let nodes = svc.get_execution(execute_id, true).await.unwrap().node_executions;
    assert!(nodes.iter().all(|n| n.node_id != "never"));
}

#[tokio::test]
async fn test_sqlite_sub_workflow_execution_is_not_a_root() {
    let svc = sqlite_service(json!({
        "steps": [
            {"type": "sub_workflow", "key": "sub_1", "workflow_id": 9, "output": {"ok": 1}}
        ]
    }))
    .await;

    let root = svc.sync_execute(config(), Map::new()).await.unwrap();
    let parent = svc.get_node_execution(root.id, "sub_1").await.unwrap().node;
    let child_id = parent.sub_execution_id.expect("child execution id");

    let err = svc.cancel(child_id, 9, SPACE_ID).await.unwrap_err();
    assert!(matches!(err, ExecError::NotRoot { .. }));
    assert_eq!(err.current_status(), Some(WorkflowStatus::Success));
}
