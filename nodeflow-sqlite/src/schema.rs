use sqlx::SqlitePool;

pub const CREATE_WORKFLOW_EXECUTION: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_execution (
    id INTEGER PRIMARY KEY,
    workflow_id INTEGER NOT NULL,
    version TEXT NOT NULL DEFAULT '',
    space_id INTEGER NOT NULL,
    mode INTEGER NOT NULL,
    operator_id INTEGER NOT NULL DEFAULT 0,
    connector_id INTEGER NOT NULL DEFAULT 0,
    connector_uid TEXT NOT NULL DEFAULT '',
    app_id INTEGER,
    agent_id INTEGER,
    sync_pattern INTEGER NOT NULL DEFAULT 0,
    input_fail_fast INTEGER NOT NULL DEFAULT 0,
    cancellable INTEGER NOT NULL DEFAULT 0,
    status INTEGER NOT NULL,
    input TEXT,
    output TEXT,
    error_code TEXT,
    fail_reason TEXT,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    duration INTEGER NOT NULL DEFAULT 0,
    node_count INTEGER NOT NULL DEFAULT 0,
    commit_id TEXT NOT NULL DEFAULT '',
    log_id TEXT NOT NULL DEFAULT '',
    parent_node_id TEXT,
    parent_node_execute_id INTEGER,
    root_execution_id INTEGER NOT NULL,
    resume_event_id INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);
"#;

pub const CREATE_WORKFLOW_EXECUTION_ROOT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_workflow_execution_root
    ON workflow_execution (root_execution_id);
"#;

pub const CREATE_NODE_EXECUTION: &str = r#"
CREATE TABLE IF NOT EXISTS node_execution (
    id INTEGER PRIMARY KEY,
    execute_id INTEGER NOT NULL,
    node_id TEXT NOT NULL,
    node_name TEXT NOT NULL DEFAULT '',
    node_type TEXT NOT NULL,
    status INTEGER NOT NULL,
    input TEXT,
    output TEXT,
    raw_output TEXT,
    error_info TEXT,
    error_level TEXT,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    duration INTEGER NOT NULL DEFAULT 0,
    composite_node_index INTEGER NOT NULL DEFAULT 0,
    composite_node_items TEXT,
    parent_node_id TEXT,
    sub_execute_id INTEGER,
    extra TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER
);
"#;

pub const CREATE_NODE_EXECUTION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_node_execution_execute_node
    ON node_execution (execute_id, node_id);
"#;

pub const ALL: [&str; 4] = [
    CREATE_WORKFLOW_EXECUTION,
    CREATE_WORKFLOW_EXECUTION_ROOT_INDEX,
    CREATE_NODE_EXECUTION,
    CREATE_NODE_EXECUTION_INDEX,
];

/// Idempotent; safe to run on every start.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in ALL {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
