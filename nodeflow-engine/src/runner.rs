use std::sync::Arc;
use std::time::Duration;

use nodeflow_dto::dto::{
    ExecuteConfig, ExecutionEvent, InterruptEvent, ResumeRequest, WorkflowBasic,
    WorkflowExecution, WorkflowStatus,
};
use nodeflow_hook::ExecutionEventDispatcher;
use nodeflow_storage::entities::{ExecutionUpdate, UpdateOutcome};
use nodeflow_storage::traits::{ExecutionRecordStore, InterruptEventQueue};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::context::{ResumeContext, RunContext};
use crate::error::EngineError;
use crate::event_handle::{EventStores, ExecuteEventLoop};
use crate::stream::StreamWriter;
use crate::traits::IdGenerator;

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    pub cancel_check_interval: Duration,
    pub event_buffer: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            cancel_check_interval: Duration::from_millis(500),
            event_buffer: 100,
        }
    }
}

/// One start or resume of a root execution.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub basic: WorkflowBasic,
    pub config: ExecuteConfig,
    pub input: String,
    pub node_count: i32,
    pub resume: Option<ResumeRequest>,
    pub stream: Option<StreamWriter>,
}

/// Resolves to the run's terminal event once its event loop exits.
pub struct RunCompletion {
    handle: JoinHandle<Option<ExecutionEvent>>,
}

impl RunCompletion {
    pub async fn wait(self) -> Option<ExecutionEvent> {
        match self.handle.await {
            Ok(last) => last,
            Err(e) => {
                error!(error = %e, "event loop task failed");
                None
            }
        }
    }
}

/// A run whose record and event loop are in place. Hand `ctx` to the graph.
pub struct PreparedRun {
    pub execute_id: i64,
    pub ctx: RunContext,
    pub completion: RunCompletion,
}

/// Sets up executions for the graph engine: records, resume bookkeeping
/// and the event loop that persists what the engine reports.
#[derive(Clone)]
pub struct WorkflowRunner {
    stores: EventStores,
    ids: Arc<dyn IdGenerator>,
    hooks: ExecutionEventDispatcher,
    settings: RunnerSettings,
}

impl WorkflowRunner {
    pub fn new(
        stores: EventStores,
        ids: Arc<dyn IdGenerator>,
        hooks: ExecutionEventDispatcher,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            stores,
            ids,
            hooks,
            settings,
        }
    }

    pub async fn prepare(&self, req: RunRequest) -> Result<PreparedRun, EngineError> {
        let (execute_id, resume) = match &req.resume {
            None => (self.create_root_execution(&req).await?, None),
            Some(resume) => (resume.execute_id, Some(self.prepare_resume(resume).await?)),
        };

        let (tx, rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let ctx = RunContext::new(
            execute_id,
            req.basic,
            req.config.clone(),
            resume,
            self.ids.clone(),
            tx,
        );
        let event_loop = ExecuteEventLoop::new(
            self.stores.clone(),
            self.hooks.clone(),
            execute_id,
            &req.config,
            ctx.cancel.clone(),
            self.settings.cancel_check_interval,
        )
        .with_stream(req.stream);
        let handle = tokio::spawn(event_loop.run(rx));

        Ok(PreparedRun {
            execute_id,
            ctx,
            completion: RunCompletion { handle },
        })
    }

    async fn create_root_execution(&self, req: &RunRequest) -> Result<i64, EngineError> {
        let execute_id = self.ids.gen_id().await?;
        let mut exec = WorkflowExecution::new_root(
            execute_id,
            req.basic.id,
            req.basic.space_id,
            req.config.clone(),
        );
        exec.version = req.basic.version.clone();
        exec.commit_id = req.basic.commit_id.clone();
        exec.input = Some(req.input.clone());
        exec.node_count = req.node_count;
        exec.log_id = Uuid::new_v4().to_string();

        self.stores.store.create_execution(&exec).await?;
        info!(
            execute_id,
            workflow_id = req.basic.id,
            log_id = %exec.log_id,
            mode = ?req.config.mode,
            "🚀 workflow execution created"
        );
        Ok(execute_id)
    }

    async fn prepare_resume(&self, req: &ResumeRequest) -> Result<ResumeContext, EngineError> {
        let mut event = self
            .stores
            .cache
            .peek_first(req.execute_id)
            .await?
            .ok_or(EngineError::InterruptEventNotFound {
                execute_id: req.execute_id,
                event_id: req.event_id,
            })?;
        if event.id != req.event_id {
            return Err(EngineError::InterruptEventMismatch {
                expected: event.id,
                actual: req.event_id,
            });
        }

        if let Some(question) = event.question_mut() {
            append_answer(question, &req.resume_data)?;
        }

        match self
            .stores
            .store
            .try_acquire_resume_lock(req.execute_id, event.id)
            .await?
        {
            UpdateOutcome::Applied { .. } => {}
            UpdateOutcome::Conflict { current } => {
                return Err(EngineError::ResumeLockFailed {
                    execute_id: req.execute_id,
                    current,
                })
            }
            UpdateOutcome::NotFound => {
                return Err(EngineError::UnexpectedStatus {
                    execute_id: req.execute_id,
                    target: WorkflowStatus::Running,
                    current: None,
                })
            }
        }

        // the queue is only written while holding the lock
        if let Err(e) = self.stores.cache.replace_first(req.execute_id, &event).await {
            self.release_resume_lock(req.execute_id).await;
            return Err(e.into());
        }

        info!(
            execute_id = req.execute_id,
            event_id = event.id,
            node_key = %event.node_key,
            "🔓 resume lock acquired"
        );
        Ok(ResumeContext {
            event,
            data: req.resume_data.clone(),
        })
    }

    async fn release_resume_lock(&self, execute_id: i64) {
        let update = ExecutionUpdate::status(WorkflowStatus::Interrupted);
        match self
            .stores
            .store
            .update_on_status(execute_id, &update, &[WorkflowStatus::Running])
            .await
        {
            Ok(outcome) if outcome.is_applied() => {
                warn!(execute_id, "resume aborted, execution back to interrupted")
            }
            Ok(outcome) => error!(execute_id, ?outcome, "failed to release resume lock"),
            Err(e) => error!(execute_id, error = %e, "failed to release resume lock"),
        }
    }
}

/// Appends the user's answer to a question event's message list.
///
/// Message ids have the form `<nodeKey>_<n>`; the answer gets `n + 1` and
/// inherits the content type of the last message.
pub fn append_answer(event: &mut InterruptEvent, resume_data: &str) -> Result<(), EngineError> {
    let mut data: Value = serde_json::from_str(&event.interrupt_data).map_err(|e| {
        EngineError::ResumeData(format!("interrupt data of event {}: {}", event.id, e))
    })?;
    let messages = data
        .get_mut("messages")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| EngineError::ResumeData(format!("event {} has no messages", event.id)))?;

    let last = messages
        .last()
        .ok_or_else(|| EngineError::ResumeData(format!("event {} has empty messages", event.id)))?;
    let last_id = last.get("id").and_then(Value::as_str).unwrap_or_default();
    let (prefix, seq) = last_id
        .rsplit_once('_')
        .and_then(|(p, n)| n.parse::<i64>().ok().map(|n| (p.to_string(), n)))
        .ok_or_else(|| EngineError::ResumeData(format!("unexpected message id '{}'", last_id)))?;
    let content_type = last
        .get("content_type")
        .cloned()
        .unwrap_or_else(|| Value::String("text".into()));

    messages.push(json!({
        "type": "answer",
        "content_type": content_type,
        "content": resume_data,
        "id": format!("{}_{}", prefix, seq + 1),
    }));
    event.interrupt_data = serde_json::to_string(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_dto::dto::{InterruptEventType, NodeType, ToolInterruptEvent};

    fn question(data: &str) -> InterruptEvent {
        InterruptEvent::new(
            7,
            "qa_1",
            NodeType::QuestionAnswer,
            InterruptEventType::Question,
            data,
        )
    }

    #[test]
    fn answer_follows_last_message() {
        let mut event = question(
            r#"{"messages":[{"type":"question","content_type":"option","content":"pick","id":"qa_1_0"}]}"#,
        );
        append_answer(&mut event, "A").unwrap();

        let data: Value = serde_json::from_str(&event.interrupt_data).unwrap();
        let messages = data["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["type"], "answer");
        assert_eq!(messages[1]["content_type"], "option");
        assert_eq!(messages[1]["content"], "A");
        assert_eq!(messages[1]["id"], "qa_1_1");
    }

    #[test]
    fn tool_call_answer_goes_to_wrapped_question() {
        let mut outer =
            InterruptEvent::new(8, "llm", NodeType::Llm, InterruptEventType::ToolCall, "{}");
        outer.tool_interrupt_event = Some(Box::new(ToolInterruptEvent {
            tool_call_id: "call_1".into(),
            tool_name: "ask".into(),
            execute_id: 3,
            event: question(r#"{"messages":[{"type":"question","content":"?","id":"ask_3"}]}"#),
        }));

        let target = outer.question_mut().unwrap();
        append_answer(target, "yes").unwrap();

        let inner = &outer.tool_interrupt_event.as_ref().unwrap().event;
        assert!(inner.interrupt_data.contains("\"id\":\"ask_4\""));
        assert!(inner.interrupt_data.contains("\"content_type\":\"text\""));
        assert_eq!(outer.interrupt_data, "{}");
    }

    #[test]
    fn malformed_question_data_is_rejected() {
        assert!(append_answer(&mut question("not json"), "x").is_err());
        assert!(append_answer(&mut question(r#"{"messages":[]}"#), "x").is_err());
        assert!(append_answer(&mut question(r#"{"messages":[{"id":"noseq"}]}"#), "x").is_err());
    }
}
