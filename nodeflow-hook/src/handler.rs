use async_trait::async_trait;
use nodeflow_dto::dto::ExecutionEvent;

/// Observes engine events after the execution stores have applied them.
#[async_trait]
pub trait ExecutionEventHandler: Send + Sync {
    async fn handle_event(&self, event: &ExecutionEvent);
}
