use std::sync::Arc;

use nodeflow_common::NodeflowConfig;
use nodeflow_engine::{
    EventStores, GraphCompiler, IdGenerator, RunnerSettings, WorkflowRepository, WorkflowRunner,
};
use nodeflow_hook::ExecutionEventDispatcher;
use nodeflow_storage::traits::{ExecutionCache, ExecutionRecordStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExecutionRecordStore>,
    pub cache: Arc<dyn ExecutionCache>,
    pub repository: Arc<dyn WorkflowRepository>,
    pub compiler: Arc<dyn GraphCompiler>,
    pub ids: Arc<dyn IdGenerator>,
    pub hooks: ExecutionEventDispatcher,
    pub config: NodeflowConfig,
}

impl AppState {
    pub fn runner(&self) -> WorkflowRunner {
        WorkflowRunner::new(
            EventStores {
                store: self.store.clone(),
                cache: self.cache.clone(),
            },
            self.ids.clone(),
            self.hooks.clone(),
            RunnerSettings {
                cancel_check_interval: self.config.cancel_check_interval,
                ..Default::default()
            },
        )
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &"ExecutionRecordStore")
            .field("cache", &"ExecutionCache")
            .field("repository", &"WorkflowRepository")
            .field("compiler", &"GraphCompiler")
            .field("hooks", &self.hooks.handler_count())
            .field("config", &self.config)
            .finish()
    }
}
