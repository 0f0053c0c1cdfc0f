mod common;

use common::setup_pool;
use nodeflow_sqlite::crud::node_execution_crud::*;
use nodeflow_sqlite::crud::workflow_execution_crud::*;
use nodeflow_sqlite::models::node_execution::{NodeExecutionRow, UpdateNodeExecutionRow};
use nodeflow_sqlite::models::workflow_execution::{StatusTransitionRow, WorkflowExecutionRow};
use nodeflow_sqlite::tx_exec;

fn execution_row(id: i64, root: i64) -> WorkflowExecutionRow {
    WorkflowExecutionRow {
        id,
        workflow_id: 7,
        space_id: 1,
        mode: 1,
        status: 1,
        root_execution_id: root,
        created_at: 1_700_000_000_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_conditional_update_respects_allowed_statuses() {
    let pool = setup_pool().await;
    let mut tx = pool.begin().await.unwrap();

    tx_exec!(tx, create_execution(&execution_row(1, 1))).unwrap();

    let to_interrupted = StatusTransitionRow { status: 5, updated_at: 1, ..Default::default() };
    let rows = tx_exec!(tx, update_on_status(1, &to_interrupted, &[1])).unwrap();
    assert_eq!(rows, 1);

    // already Interrupted, so a Running-only update misses
    let to_success = StatusTransitionRow { status: 2, ..Default::default() };
    let rows = tx_exec!(tx, update_on_status(1, &to_success, &[1])).unwrap();
    assert_eq!(rows, 0);
    assert_eq!(tx_exec!(tx, get_status(1)).unwrap(), Some(5));

    let rows = tx_exec!(tx, update_on_status(1, &to_success, &[])).unwrap();
    assert_eq!(rows, 0);

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_resume_lock_requires_zero_token() {
    let pool = setup_pool().await;
    let mut tx = pool.begin().await.unwrap();

    let mut row = execution_row(1, 1);
    row.status = 5;
    tx_exec!(tx, create_execution(&row)).unwrap();

    assert_eq!(tx_exec!(tx, acquire_resume_lock(1, 42, 1, 5, 10)).unwrap(), 1);
    let fetched = tx_exec!(tx, get_execution(1)).unwrap().unwrap();
    assert_eq!(fetched.resume_event_id, 42);
    assert_eq!(fetched.status, 1);

    let back = StatusTransitionRow { status: 5, resume_event_id: 42, ..Default::default() };
    tx_exec!(tx, update_on_status(1, &back, &[1])).unwrap();
    assert_eq!(tx_exec!(tx, acquire_resume_lock(1, 43, 1, 5, 11)).unwrap(), 0);

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_node_dynamic_update_and_cancel_scope() {
    let pool = setup_pool().await;
    let mut tx = pool.begin().await.unwrap();

    tx_exec!(tx, create_execution(&execution_row(1, 1))).unwrap();
    tx_exec!(tx, create_execution(&execution_row(2, 1))).unwrap();
    tx_exec!(tx, create_execution(&execution_row(3, 3))).unwrap();

    for (id, exe) in [(10, 1), (11, 2), (12, 3)] {
        let node = NodeExecutionRow {
            id,
            execute_id: exe,
            node_id: format!("n{}", id),
            node_type: "LLM".into(),
            status: 1,
            created_at: 1,
            ..Default::default()
        };
        tx_exec!(tx, create_node_execution(&node)).unwrap();
    }

    let empty = UpdateNodeExecutionRow::default();
    assert_eq!(tx_exec!(tx, update_node_execution(10, &empty)).unwrap(), 0);

    let changes = UpdateNodeExecutionRow {
        output: Some("{\"x\":1}".into()),
        duration: Some(9),
        ..Default::default()
    };
    assert_eq!(tx_exec!(tx, update_node_execution(10, &changes)).unwrap(), 1);
    let node = tx_exec!(tx, find_by_node(1, "n10")).unwrap().unwrap();
    assert_eq!(node.output.as_deref(), Some("{\"x\":1}"));
    assert_eq!(node.status, 1);

    // execution 3 is a separate root and stays untouched
    let failed = tx_exec!(
        tx,
        fail_running_nodes(1, 1, 3, "workflow cancel by user", "cancel", 5)
    )
    .unwrap();
    assert_eq!(failed, 2);
    let other = tx_exec!(tx, find_by_execution(3)).unwrap();
    assert_eq!(other[0].status, 1);

    let cancelled = tx_exec!(
        tx,
        cancel_live_executions(1, 4, &[1, 5], "777777777", "workflow cancel by user", 5)
    )
    .unwrap();
    assert_eq!(cancelled, 2);
    assert_eq!(tx_exec!(tx, get_status(3)).unwrap(), Some(1));

    tx.rollback().await.unwrap();
}
