use sqlx::{Executor, QueryBuilder, Result, Sqlite};

use crate::models::workflow_execution::{StatusTransitionRow, WorkflowExecutionRow};

const SELECT_COLUMNS: &str = r#"
    SELECT id, workflow_id, version, space_id, mode, operator_id, connector_id,
           connector_uid, app_id, agent_id, sync_pattern, input_fail_fast, cancellable,
           status, input, output, error_code, fail_reason, input_tokens, output_tokens,
           duration, node_count,
           commit_id, log_id, parent_node_id, parent_node_execute_id, root_execution_id,
           resume_event_id, created_at, updated_at
    FROM workflow_execution
"#;

pub async fn create_execution<'e, E>(executor: E, exec: &WorkflowExecutionRow) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO workflow_execution (
            id, workflow_id, version, space_id, mode, operator_id, connector_id,
            connector_uid, app_id, agent_id, sync_pattern, input_fail_fast, cancellable,
            status, input, output, error_code, fail_reason, input_tokens, output_tokens,
            duration, node_count,
            commit_id, log_id, parent_node_id, parent_node_execute_id, root_execution_id,
            resume_event_id, created_at, updated_at
        ) VALUES (
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        )
        "#,
    )
    .bind(exec.id)
    .bind(exec.workflow_id)
    .bind(&exec.version)
    .bind(exec.space_id)
    .bind(exec.mode)
    .bind(exec.operator_id)
    .bind(exec.connector_id)
    .bind(&exec.connector_uid)
    .bind(exec.app_id)
    .bind(exec.agent_id)
    .bind(exec.sync_pattern)
    .bind(exec.input_fail_fast)
    .bind(exec.cancellable)
    .bind(exec.status)
    .bind(&exec.input)
    .bind(&exec.output)
    .bind(&exec.error_code)
    .bind(&exec.fail_reason)
    .bind(exec.input_tokens)
    .bind(exec.output_tokens)
    .bind(exec.duration)
    .bind(exec.node_count)
    .bind(&exec.commit_id)
    .bind(&exec.log_id)
    .bind(&exec.parent_node_id)
    .bind(exec.parent_node_execute_id)
    .bind(exec.root_execution_id)
    .bind(exec.resume_event_id)
    .bind(exec.created_at)
    .bind(exec.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_execution<'e, E>(executor: E, id: i64) -> Result<Option<WorkflowExecutionRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, WorkflowExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn get_status<'e, E>(executor: E, id: i64) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT status FROM workflow_execution WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// `UPDATE ... WHERE id = ? AND status IN (allowed)`; returns rows affected.
pub async fn update_on_status<'e, E>(
    executor: E,
    id: i64,
    changes: &StatusTransitionRow,
    allowed: &[i64],
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    if allowed.is_empty() {
        return Ok(0);
    }

    let mut query = QueryBuilder::<Sqlite>::new("UPDATE workflow_execution SET ");
    query.push("status = ").push_bind(changes.status);
    query.push(", output = ").push_bind(changes.output.clone());
    query.push(", duration = ").push_bind(changes.duration);
    query.push(", error_code = ").push_bind(changes.error_code.clone());
    query.push(", fail_reason = ").push_bind(changes.fail_reason.clone());
    query.push(", input_tokens = ").push_bind(changes.input_tokens);
    query.push(", output_tokens = ").push_bind(changes.output_tokens);
    query.push(", resume_event_id = ").push_bind(changes.resume_event_id);
    query.push(", updated_at = ").push_bind(changes.updated_at);
    query.push(" WHERE id = ").push_bind(id);
    query.push(" AND status IN (");
    let mut statuses = query.separated(", ");
    for s in allowed {
        statuses.push_bind(*s);
    }
    statuses.push_unseparated(")");

    let res = query.build().execute(executor).await?;
    Ok(res.rows_affected())
}

pub async fn acquire_resume_lock<'e, E>(
    executor: E,
    id: i64,
    event_id: i64,
    running: i64,
    interrupted: i64,
    updated_at: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        r#"
        UPDATE workflow_execution
        SET status = ?, resume_event_id = ?, updated_at = ?
        WHERE id = ? AND resume_event_id = 0 AND status = ?
        "#,
    )
    .bind(running)
    .bind(event_id)
    .bind(updated_at)
    .bind(id)
    .bind(interrupted)
    .execute(executor)
    .await?;
    Ok(res.rows_affected())
}

/// Cancels `id` and every execution rooted at it that is still live.
pub async fn cancel_live_executions<'e, E>(
    executor: E,
    id: i64,
    cancelled: i64,
    live: &[i64],
    error_code: &str,
    fail_reason: &str,
    updated_at: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE workflow_execution SET status = ");
    query.push_bind(cancelled);
    query.push(", error_code = ").push_bind(error_code.to_string());
    query.push(", fail_reason = ").push_bind(fail_reason.to_string());
    query.push(", resume_event_id = 0, updated_at = ").push_bind(updated_at);
    query.push(" WHERE (id = ").push_bind(id);
    query.push(" OR root_execution_id = ").push_bind(id);
    query.push(") AND status IN (");
    let mut statuses = query.separated(", ");
    for s in live {
        statuses.push_bind(*s);
    }
    statuses.push_unseparated(")");

    let res = query.build().execute(executor).await?;
    Ok(res.rows_affected())
}
