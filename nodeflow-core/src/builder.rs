use std::sync::Arc;

use anyhow::{Context, Result};
use nodeflow_common::{CacheBackend, NodeflowConfig};
use nodeflow_engine::{GraphCompiler, IdGenerator, LocalIdGenerator, WorkflowRepository};
use nodeflow_hook::impls::log_hook::LogHook;
use nodeflow_hook::{ExecutionEventDispatcher, ExecutionEventHandler};
use nodeflow_redis::RedisExecutionCache;
use nodeflow_sqlite::{db::init_pool, schema::init_schema, SqliteExecutionStore};
use nodeflow_storage::memory::{MemoryCache, MemoryExecutionStore};
use nodeflow_storage::traits::{ExecutionCache, NodeOutputCache};
use tracing::info;

use crate::app_state::AppState;

/// The parts of a deployment this crate does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub repository: Arc<dyn WorkflowRepository>,
    pub compiler: Arc<dyn GraphCompiler>,
    /// Defaults to [`LocalIdGenerator`].
    pub ids: Option<Arc<dyn IdGenerator>>,
}

fn hooks() -> ExecutionEventDispatcher {
    let log_hook: Arc<dyn ExecutionEventHandler> = LogHook::new();
    ExecutionEventDispatcher::new(vec![log_hook])
}

fn id_generator(collaborators: &Collaborators) -> Arc<dyn IdGenerator> {
    collaborators
        .ids
        .clone()
        .unwrap_or_else(|| Arc::new(LocalIdGenerator::new()))
}

/// SQLite records plus the configured fast cache.
pub async fn build_app_state(
    cfg: &NodeflowConfig,
    collaborators: Collaborators,
) -> Result<AppState> {
    info!("🔧 building app state: {}", cfg.summary());

    // ---- Fast cache ----
    let (cache, output_cache): (Arc<dyn ExecutionCache>, Arc<dyn NodeOutputCache>) =
        match cfg.cache_backend {
            CacheBackend::Redis => {
                let redis = Arc::new(
                    RedisExecutionCache::connect(&cfg.redis_url)
                        .await
                        .with_context(|| format!("failed to connect to {}", cfg.redis_url))?,
                );
                (redis.clone(), redis)
            }
            CacheBackend::Memory => {
                let memory = Arc::new(MemoryCache::new());
                (memory.clone(), memory)
            }
        };

    // ---- Durable store ----
    let pool = init_pool(&cfg.db_url, cfg.max_db_connections)
        .await
        .with_context(|| format!("failed to open {}", cfg.db_url))?;
    init_schema(&pool).await.context("failed to apply schema")?;
    let store = Arc::new(SqliteExecutionStore::new(pool, output_cache));

    Ok(AppState {
        store,
        cache,
        ids: id_generator(&collaborators),
        repository: collaborators.repository,
        compiler: collaborators.compiler,
        hooks: hooks().enable_background(256),
        config: cfg.clone(),
    })
}

/// Everything in process memory; nothing survives a restart.
pub fn build_memory_state(cfg: &NodeflowConfig, collaborators: Collaborators) -> AppState {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryExecutionStore::new(cache.clone()));

    AppState {
        store,
        cache,
        ids: id_generator(&collaborators),
        repository: collaborators.repository,
        compiler: collaborators.compiler,
        hooks: hooks(),
        config: cfg.clone(),
    }
}
