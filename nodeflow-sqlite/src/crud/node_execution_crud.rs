use sqlx::{Executor, QueryBuilder, Result, Sqlite};

use crate::models::node_execution::{NodeExecutionRow, UpdateNodeExecutionRow};

const SELECT_COLUMNS: &str = r#"
    SELECT id, execute_id, node_id, node_name, node_type, status, input, output,
           raw_output, error_info, error_level, input_tokens, output_tokens, duration,
           composite_node_index, composite_node_items, parent_node_id, sub_execute_id,
           extra, created_at, updated_at
    FROM node_execution
"#;

pub async fn create_node_execution<'e, E>(executor: E, node: &NodeExecutionRow) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO node_execution (
            id, execute_id, node_id, node_name, node_type, status, input, output,
            raw_output, error_info, error_level, input_tokens, output_tokens, duration,
            composite_node_index, composite_node_items, parent_node_id, sub_execute_id,
            extra, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(node.id)
    .bind(node.execute_id)
    .bind(&node.node_id)
    .bind(&node.node_name)
    .bind(&node.node_type)
    .bind(node.status)
    .bind(&node.input)
    .bind(&node.output)
    .bind(&node.raw_output)
    .bind(&node.error_info)
    .bind(&node.error_level)
    .bind(node.input_tokens)
    .bind(node.output_tokens)
    .bind(node.duration)
    .bind(node.composite_node_index)
    .bind(&node.composite_node_items)
    .bind(&node.parent_node_id)
    .bind(node.sub_execute_id)
    .bind(&node.extra)
    .bind(node.created_at)
    .bind(node.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Writes only the fields that are set; returns rows affected.
pub async fn update_node_execution<'e, E>(
    executor: E,
    id: i64,
    changes: &UpdateNodeExecutionRow,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let mut query = QueryBuilder::<Sqlite>::new("UPDATE node_execution SET ");
    let mut has_fields = false;

    macro_rules! set_field {
        ($field:ident) => {
            if let Some(val) = &changes.$field {
                if has_fields {
                    query.push(", ");
                }
                query.push(stringify!($field)).push(" = ").push_bind(val.clone());
                has_fields = true;
            }
        };
    }

    set_field!(status);
    set_field!(input);
    set_field!(output);
    set_field!(raw_output);
    set_field!(error_info);
    set_field!(error_level);
    set_field!(input_tokens);
    set_field!(output_tokens);
    set_field!(duration);
    set_field!(sub_execute_id);
    set_field!(extra);
    set_field!(updated_at);

    if !has_fields {
        return Ok(0);
    }

    query.push(" WHERE id = ").push_bind(id);
    let res = query.build().execute(executor).await?;
    Ok(res.rows_affected())
}

pub async fn set_sub_execute_id<'e, E>(executor: E, id: i64, sub_execute_id: i64) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("UPDATE node_execution SET sub_execute_id = ? WHERE id = ?")
        .bind(sub_execute_id)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(res.rows_affected())
}

/// Fails the running nodes of `root_id` and of every execution rooted at it.
pub async fn fail_running_nodes<'e, E>(
    executor: E,
    root_id: i64,
    running: i64,
    failed: i64,
    error_info: &str,
    error_level: &str,
    updated_at: i64,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        r#"
        UPDATE node_execution
        SET status = ?, error_info = ?, error_level = ?, updated_at = ?
        WHERE status = ?
          AND execute_id IN (
              SELECT id FROM workflow_execution WHERE id = ? OR root_execution_id = ?
          )
        "#,
    )
    .bind(failed)
    .bind(error_info)
    .bind(error_level)
    .bind(updated_at)
    .bind(running)
    .bind(root_id)
    .bind(root_id)
    .execute(executor)
    .await?;
    Ok(res.rows_affected())
}

pub async fn find_by_execution<'e, E>(executor: E, execute_id: i64) -> Result<Vec<NodeExecutionRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE execute_id = ? ORDER BY id", SELECT_COLUMNS);
    sqlx::query_as::<_, NodeExecutionRow>(&sql)
        .bind(execute_id)
        .fetch_all(executor)
        .await
}

pub async fn find_by_node<'e, E>(
    executor: E,
    execute_id: i64,
    node_id: &str,
) -> Result<Option<NodeExecutionRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{} WHERE execute_id = ? AND node_id = ? ORDER BY id LIMIT 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, NodeExecutionRow>(&sql)
        .bind(execute_id)
        .bind(node_id)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_parent<'e, E>(
    executor: E,
    execute_id: i64,
    parent_node_id: &str,
) -> Result<Vec<NodeExecutionRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "{} WHERE execute_id = ? AND parent_node_id = ? ORDER BY id",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, NodeExecutionRow>(&sql)
        .bind(execute_id)
        .bind(parent_node_id)
        .fetch_all(executor)
        .await
}
