use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use nodeflow_dto::dto::InterruptEvent;

use crate::error::StorageError;
use crate::queue_policy::plan_append;
use crate::traits::{CancelSignalStore, InterruptEventQueue, LatestExecutionStore, NodeOutputCache};

#[derive(Default)]
struct CacheInner {
    queues: HashMap<i64, VecDeque<InterruptEvent>>,
    previous_resumed: HashMap<i64, InterruptEvent>,
    cancelled: HashSet<i64>,
    node_outputs: HashMap<i64, String>,
    latest_test_run: HashMap<(i64, i64), i64>,
    latest_node_debug: HashMap<(i64, String, i64), i64>,
}

/// Single-process stand-in for the Redis cache. Entries never expire.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InterruptEventQueue for MemoryCache {
    async fn append_events(
        &self,
        execute_id: i64,
        events: &[InterruptEvent],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let previous = inner.previous_resumed.get(&execute_id).cloned();
        let queue = inner.queues.entry(execute_id).or_default();
        let queued: Vec<InterruptEvent> = queue.iter().cloned().collect();
        plan_append(&queued, previous.as_ref(), events).apply(queue);
        Ok(())
    }

    async fn peek_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.queues.get(&execute_id).and_then(|q| q.front().cloned()))
    }

    async fn replace_first(
        &self,
        execute_id: i64,
        event: &InterruptEvent,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let head = inner
            .queues
            .get_mut(&execute_id)
            .and_then(|q| q.front_mut())
            .ok_or_else(|| {
                StorageError::NotFound(format!("interrupt event queue of execution {}", execute_id))
            })?;
        *head = event.clone();
        inner.previous_resumed.insert(execute_id, event.clone());
        Ok(())
    }

    async fn pop_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.queues.get_mut(&execute_id).and_then(|q| q.pop_front()))
    }

    async fn list_all(&self, execute_id: i64) -> Result<Vec<InterruptEvent>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .queues
            .get(&execute_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl CancelSignalStore for MemoryCache {
    async fn set_cancel_flag(&self, execute_id: i64) -> Result<(), StorageError> {
        self.inner.lock().await.cancelled.insert(execute_id);
        Ok(())
    }

    async fn is_cancelled(&self, execute_id: i64) -> Result<bool, StorageError> {
        Ok(self.inner.lock().await.cancelled.contains(&execute_id))
    }
}

#[async_trait]
impl NodeOutputCache for MemoryCache {
    async fn set_node_output(
        &self,
        node_execute_id: i64,
        output: &str,
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .await
            .node_outputs
            .insert(node_execute_id, output.to_string());
        Ok(())
    }

    async fn get_node_output(&self, node_execute_id: i64) -> Result<Option<String>, StorageError> {
        Ok(self.inner.lock().await.node_outputs.get(&node_execute_id).cloned())
    }
}

#[async_trait]
impl LatestExecutionStore for MemoryCache {
    async fn set_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .await
            .latest_test_run
            .insert((workflow_id, user_id), execute_id);
        Ok(())
    }

    async fn get_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .latest_test_run
            .get(&(workflow_id, user_id))
            .copied())
    }

    async fn set_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError> {
        self.inner
            .lock()
            .await
            .latest_node_debug
            .insert((workflow_id, node_id.to_string(), user_id), execute_id);
        Ok(())
    }

    async fn get_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError> {
        Ok(self
            .inner
            .lock()
            .await
            .latest_node_debug
            .get(&(workflow_id, node_id.to_string(), user_id))
            .copied())
    }
}
