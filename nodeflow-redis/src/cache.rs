use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::info;

use nodeflow_dto::dto::InterruptEvent;
use nodeflow_storage::error::StorageError;
use nodeflow_storage::queue_policy::plan_append;
use nodeflow_storage::traits::{
    CancelSignalStore, InterruptEventQueue, LatestExecutionStore, NodeOutputCache,
};

use crate::keys;

/// Redis-backed fast cache: interrupt queues, cancel flags, streaming output, debug pointers.
#[derive(Clone)]
pub struct RedisExecutionCache {
    conn: ConnectionManager,
}

fn cache_err(e: redis::RedisError) -> StorageError {
    StorageError::Cache(e.to_string())
}

fn encode(event: &InterruptEvent) -> Result<String, StorageError> {
    serde_json::to_string(event).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode(raw: &str) -> Result<InterruptEvent, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::DeserializationError(format!("interrupt event: {}", e)))
}

impl RedisExecutionCache {
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        info!("🔌 connected to redis");
        Ok(Self { conn })
    }

    async fn set_ex(&self, key: String, value: String, ttl: u64) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        Ok(())
    }

    async fn get(&self, key: String) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }

    async fn get_id(&self, key: String) -> Result<Option<i64>, StorageError> {
        match self.get(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|e| StorageError::InvalidData(format!("execution id {}: {}", raw, e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InterruptEventQueue for RedisExecutionCache {
    async fn append_events(
        &self,
        execute_id: i64,
        events: &[InterruptEvent],
    ) -> Result<(), StorageError> {
        let list_key = keys::interrupt_list(execute_id);
        let queued = self.list_all(execute_id).await?;
        let previous = self
            .get(keys::previous_resumed(execute_id))
            .await?
            .as_deref()
            .map(decode)
            .transpose()?;

        let plan = plan_append(&queued, previous.as_ref(), events);
        if plan.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(front) = &plan.front {
            pipe.cmd("LPUSH").arg(&list_key).arg(encode(front)?).ignore();
        }
        if !plan.back.is_empty() {
            let back = plan.back.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
            pipe.cmd("RPUSH").arg(&list_key).arg(back).ignore();
        }
        pipe.cmd("EXPIRE")
            .arg(&list_key)
            .arg(keys::INTERRUPT_LIST_TTL_SECS)
            .ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_err)?;
        Ok(())
    }

    async fn peek_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("LINDEX")
            .arg(keys::interrupt_list(execute_id))
            .arg(0)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        raw.as_deref().map(decode).transpose()
    }

    async fn replace_first(
        &self,
        execute_id: i64,
        event: &InterruptEvent,
    ) -> Result<(), StorageError> {
        if self.peek_first(execute_id).await?.is_none() {
            return Err(StorageError::NotFound(format!(
                "interrupt event queue of execution {}",
                execute_id
            )));
        }

        let list_key = keys::interrupt_list(execute_id);
        let encoded = encode(event)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LSET")
            .arg(&list_key)
            .arg(0)
            .arg(&encoded)
            .ignore()
            .cmd("SET")
            .arg(keys::previous_resumed(execute_id))
            .arg(&encoded)
            .arg("EX")
            .arg(keys::PREVIOUS_RESUMED_TTL_SECS)
            .ignore()
            .cmd("EXPIRE")
            .arg(&list_key)
            .arg(keys::INTERRUPT_LIST_TTL_SECS)
            .ignore();

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(cache_err)?;
        Ok(())
    }

    async fn pop_first(&self, execute_id: i64) -> Result<Option<InterruptEvent>, StorageError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("LPOP")
            .arg(keys::interrupt_list(execute_id))
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        raw.as_deref().map(decode).transpose()
    }

    async fn list_all(&self, execute_id: i64) -> Result<Vec<InterruptEvent>, StorageError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(keys::interrupt_list(execute_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(cache_err)?;
        raw.iter().map(|r| decode(r)).collect()
    }
}

#[async_trait]
impl CancelSignalStore for RedisExecutionCache {
    async fn set_cancel_flag(&self, execute_id: i64) -> Result<(), StorageError> {
        self.set_ex(keys::cancel_flag(execute_id), "1".into(), keys::CANCEL_FLAG_TTL_SECS)
            .await
    }

    async fn is_cancelled(&self, execute_id: i64) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS")
            .arg(keys::cancel_flag(execute_id))
            .query_async(&mut conn)
            .await
            .map_err(cache_err)
    }
}

#[async_trait]
impl NodeOutputCache for RedisExecutionCache {
    async fn set_node_output(
        &self,
        node_execute_id: i64,
        output: &str,
    ) -> Result<(), StorageError> {
        self.set_ex(
            keys::node_output(node_execute_id),
            output.to_string(),
            keys::NODE_OUTPUT_TTL_SECS,
        )
        .await
    }

    async fn get_node_output(&self, node_execute_id: i64) -> Result<Option<String>, StorageError> {
        self.get(keys::node_output(node_execute_id)).await
    }
}

#[async_trait]
impl LatestExecutionStore for RedisExecutionCache {
    async fn set_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError> {
        self.set_ex(
            keys::latest_test_run(workflow_id, user_id),
            execute_id.to_string(),
            keys::LATEST_EXECUTION_TTL_SECS,
        )
        .await
    }

    async fn get_latest_test_run(
        &self,
        workflow_id: i64,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError> {
        self.get_id(keys::latest_test_run(workflow_id, user_id)).await
    }

    async fn set_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
        execute_id: i64,
    ) -> Result<(), StorageError> {
        self.set_ex(
            keys::latest_node_debug(workflow_id, node_id, user_id),
            execute_id.to_string(),
            keys::LATEST_EXECUTION_TTL_SECS,
        )
        .await
    }

    async fn get_latest_node_debug(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
    ) -> Result<Option<i64>, StorageError> {
        self.get_id(keys::latest_node_debug(workflow_id, node_id, user_id))
            .await
    }
}
