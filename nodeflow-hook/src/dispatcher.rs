use std::sync::Arc;

use nodeflow_dto::dto::ExecutionEvent;
use tokio::sync::mpsc;
use tracing::warn;

use crate::ExecutionEventHandler;

/// Fans engine events out to the registered hooks.
///
/// By default hooks run inline, in registration order. `enable_background`
/// moves them onto a dedicated task so slow hooks never hold up the event
/// loop; events are still delivered in order.
#[derive(Clone)]
pub struct ExecutionEventDispatcher {
    handlers: Vec<Arc<dyn ExecutionEventHandler>>,
    background: Option<mpsc::Sender<ExecutionEvent>>,
}

impl ExecutionEventDispatcher {
    pub fn new(handlers: Vec<Arc<dyn ExecutionEventHandler>>) -> Self {
        Self {
            handlers,
            background: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_handler(mut self, handler: Arc<dyn ExecutionEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn enable_background(mut self, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ExecutionEvent>(capacity.max(1));
        let handlers = self.handlers.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                Self::run_handlers(&handlers, &event).await;
            }
        });

        self.background = Some(tx);
        self
    }

    async fn run_handlers(handlers: &[Arc<dyn ExecutionEventHandler>], event: &ExecutionEvent) {
        for handler in handlers {
            handler.handle_event(event).await;
        }
    }

    pub async fn dispatch(&self, event: &ExecutionEvent) {
        if self.handlers.is_empty() {
            return;
        }
        match &self.background {
            Some(tx) => {
                if tx.send(event.clone()).await.is_err() {
                    warn!(event = event.kind.name(), "hook worker stopped, event dropped");
                }
            }
            None => Self::run_handlers(&self.handlers, event).await,
        }
    }
}
