use nodeflow_dto::dto::InterruptEvent;

use crate::error::StorageError;

/// Ordered pending interrupt events per execution.
///
/// Callers must hold the execution's resume lock (or be the single event loop of
/// the run) while mutating; the queue does no locking of its own.
#[async_trait::async_trait]
pub trait InterruptEventQueue: Send + Sync {
    async fn append_events(
        &self,
        execute_id: i64,
        events: &[InterruptEvent],
    ) -> Result<(), StorageError>;

    async fn peek_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError>;

    /// Overwrite the head and remember it as the previously resumed event.
    async fn replace_first(
        &self,
        execute_id: i64,
        event: &InterruptEvent,
    ) -> Result<(), StorageError>;

    async fn pop_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError>;

    async fn list_all(&self, execute_id: i64) -> Result<Vec<InterruptEvent>, StorageError>;
}

#[async_trait::async_trait]
pub trait CancelSignalStore: Send + Sync {
    async fn set_cancel_flag(&self, execute_id: i64) -> Result<(), StorageError>;

    async fn is_cancelled(&self, execute_id: i64) -> Result<bool, StorageError>;
}

/// Partial output of streaming nodes, keyed by node execution id.
#[async_trait::async_trait]
pub trait NodeOutputCache: Send + Sync {
    async fn set_node_output(&self, node_execute_id: i64, output: &str) -> Result<(), StorageError>;

    async fn get_node_output(&self, node_execute_id: i64) -> Result<Option<String>, StorageError>;
}

/// Latest debug execution pointers.
#[async_trait::async_trait]
pub trait LatestExecutionStore: Send + Sync {
    async fn set_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError>;

    async fn get_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError>;

    async fn set_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError>;

    async fn get_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError>;
}

/// Everything the fast cache provides.
pub trait ExecutionCache:
    InterruptEventQueue + CancelSignalStore + NodeOutputCache + LatestExecutionStore + Send + Sync
{
}

impl<T> ExecutionCache for T where
    T: InterruptEventQueue
        + CancelSignalStore
        + NodeOutputCache
        + LatestExecutionStore
        + Send
        + Sync
{
}
