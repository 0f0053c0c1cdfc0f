use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodeflow_dto::dto::{
    EventContext, ExecuteConfig, ExecutionEvent, ExecutionEventKind, WorkflowBasic,
};
use nodeflow_hook::impls::log_hook::LogHook;
use nodeflow_hook::{ExecutionEventDispatcher, ExecutionEventHandler};

#[derive(Default)]
struct RecordingHook {
    seen: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl ExecutionEventHandler for RecordingHook {
    async fn handle_event(&self, event: &ExecutionEvent) {
        self.seen.lock().unwrap().push(event.kind.name());
    }
}

fn event(kind: ExecutionEventKind) -> ExecutionEvent {
    let ctx = EventContext {
        root_execute_id: 1,
        root_workflow: WorkflowBasic::default(),
        config: ExecuteConfig::default(),
        sub: None,
        node: None,
        resume_event: None,
    };
    ExecutionEvent::new(ctx, kind)
}

#[tokio::test]
async fn test_inline_dispatch_reaches_every_handler() {
    let first = Arc::new(RecordingHook::default());
    let second = Arc::new(RecordingHook::default());
    let dispatcher = ExecutionEventDispatcher::new(vec![first.clone(), second.clone()])
        .with_handler(LogHook::new());
    assert_eq!(dispatcher.handler_count(), 3);

    dispatcher
        .dispatch(&event(ExecutionEventKind::WorkflowStart {
            input: "{}".into(),
            node_count: 2,
        }))
        .await;
    dispatcher.dispatch(&event(ExecutionEventKind::WorkflowResume)).await;

    assert_eq!(*first.seen.lock().unwrap(), vec!["workflow_start", "workflow_resume"]);
    assert_eq!(*second.seen.lock().unwrap(), vec!["workflow_start", "workflow_resume"]);
}

#[tokio::test]
async fn test_background_dispatch_keeps_order() {
    let hook = Arc::new(RecordingHook::default());
    let dispatcher = ExecutionEventDispatcher::new(vec![hook.clone()]).enable_background(4);

    for _ in 0..3 {
        dispatcher.dispatch(&event(ExecutionEventKind::WorkflowResume)).await;
    }
    dispatcher
        .dispatch(&event(ExecutionEventKind::WorkflowCancel {
            duration_ms: 1,
            tokens: None,
        }))
        .await;

    for _ in 0..50 {
        if hook.seen.lock().unwrap().len() == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let seen = hook.seen.lock().unwrap().clone();
    assert_eq!(seen.last(), Some(&"workflow_cancel"));
    assert_eq!(seen.len(), 4);
}

#[tokio::test]
async fn test_empty_dispatcher_is_a_no_op() {
    ExecutionEventDispatcher::empty()
        .dispatch(&event(ExecutionEventKind::WorkflowResume))
        .await;
}
