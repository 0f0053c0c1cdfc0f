use std::sync::Arc;
use std::time::Duration;

use nodeflow_dto::dto::{
    DataMessage, EngineFailure, EventContext, ExecuteConfig, ExecuteMode, ExecutionEvent,
    ExecutionEventKind, InterruptEvent, NodeContext, NodeExecution, NodeStatus, NodeType,
    StateMessage, StreamMessage, TerminatePlan, TokenUsage, WorkflowExecution, WorkflowStatus,
    CANCEL_BY_USER_REASON, ERR_WORKFLOW_CANCELED_BY_USER,
};
use nodeflow_hook::ExecutionEventDispatcher;
use nodeflow_storage::entities::{ExecutionUpdate, NodeExecutionUpdate, UpdateOutcome};
use nodeflow_storage::traits::{
    CancelSignalStore, ExecutionCache, ExecutionRecordStore, InterruptEventQueue,
};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::stream::StreamWriter;

const MAX_REASON_CHARS: usize = 1000;

/// Durable store plus fast cache, shared by every run.
#[derive(Clone)]
pub struct EventStores {
    pub store: Arc<dyn ExecutionRecordStore>,
    pub cache: Arc<dyn ExecutionCache>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TerminateSignal {
    Continue,
    Abort,
    WorkflowSuccess,
    LastNodeDone,
}

#[derive(Default)]
struct LoopState {
    pending_success: Option<ExecutionEvent>,
    last_node_done: bool,
    cancelled: bool,
}

fn cap_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_CHARS).collect()
}

fn expect_applied(
    outcome: UpdateOutcome,
    execute_id: i64,
    target: WorkflowStatus,
) -> Result<(), EngineError> {
    match outcome {
        UpdateOutcome::Applied { .. } => Ok(()),
        UpdateOutcome::Conflict { current } => Err(EngineError::UnexpectedStatus {
            execute_id,
            target,
            current: Some(current),
        }),
        UpdateOutcome::NotFound => Err(EngineError::UnexpectedStatus {
            execute_id,
            target,
            current: None,
        }),
    }
}

fn node_of(ctx: &EventContext) -> Result<&NodeContext, EngineError> {
    ctx.node
        .as_ref()
        .ok_or_else(|| EngineError::InvalidEvent("node event without node context".into()))
}

/// Applies engine events of one run to the stores, streams caller-facing
/// messages and decides when the run is over.
pub struct ExecuteEventLoop {
    stores: EventStores,
    hooks: ExecutionEventDispatcher,
    stream: Option<StreamWriter>,
    execute_id: i64,
    mode: ExecuteMode,
    cancellable: bool,
    cancel: CancellationToken,
    check_interval: Duration,
}

impl ExecuteEventLoop {
    pub fn new(
        stores: EventStores,
        hooks: ExecutionEventDispatcher,
        execute_id: i64,
        config: &ExecuteConfig,
        cancel: CancellationToken,
        check_interval: Duration,
    ) -> Self {
        Self {
            stores,
            hooks,
            stream: None,
            execute_id,
            mode: config.mode,
            cancellable: config.cancellable,
            cancel,
            check_interval: check_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn with_stream(mut self, stream: Option<StreamWriter>) -> Self {
        self.stream = stream;
        self
    }

    /// Consumes events until the run terminates or the engine hangs up.
    /// Returns the terminal event, or `None` if the engine stopped without one.
    /// The run's cancellation token is fired on the way out.
    pub async fn run(self, mut events: mpsc::Receiver<ExecutionEvent>) -> Option<ExecutionEvent> {
        let mut state = LoopState::default();
        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let last = loop {
            tokio::select! {
                received = events.recv() => match received {
                    Some(event) => {
                        if let Some(terminal) = self.on_event(event, &mut state).await {
                            break Some(terminal);
                        }
                    }
                    None => break self.on_engine_gone(&mut state).await,
                },
                _ = ticker.tick(), if self.cancellable && !state.cancelled => {
                    self.check_cancel(&mut state).await;
                }
            }
        };

        self.cancel.cancel();
        info!(
            execute_id = self.execute_id,
            last_event = last.as_ref().map(|e| e.kind.name()).unwrap_or("none"),
            "[handle_execute_event] finish"
        );
        last
    }

    async fn check_cancel(&self, state: &mut LoopState) {
        match self.stores.cache.is_cancelled(self.execute_id).await {
            Ok(true) => {
                state.cancelled = true;
                info!(execute_id = self.execute_id, "🛑 workflow cancellation detected");
                self.cancel.cancel();
            }
            Ok(false) => {}
            Err(e) => error!(
                execute_id = self.execute_id,
                error = %e,
                "failed to check cancellation status"
            ),
        }
    }

    async fn on_event(
        &self,
        event: ExecutionEvent,
        state: &mut LoopState,
    ) -> Option<ExecutionEvent> {
        info!(
            execute_id = self.execute_id,
            workflow_id = event.ctx.root_workflow.id,
            event = event.kind.name(),
            node_key = event.ctx.node.as_ref().map(|n| n.node_key.as_str()).unwrap_or(""),
            "receiving event"
        );

        let signal = match self.handle_event(&event).await {
            Ok(signal) => signal,
            Err(e) => {
                error!(
                    execute_id = self.execute_id,
                    event = event.kind.name(),
                    error = %e,
                    "failed to handle event"
                );
                TerminateSignal::Continue
            }
        };
        self.hooks.dispatch(&event).await;

        match signal {
            TerminateSignal::Continue => None,
            TerminateSignal::Abort => Some(event),
            TerminateSignal::WorkflowSuccess => {
                if state.last_node_done || self.mode == ExecuteMode::NodeDebug {
                    self.finish_success(&event).await;
                    Some(event)
                } else {
                    state.pending_success = Some(event);
                    None
                }
            }
            TerminateSignal::LastNodeDone => {
                state.last_node_done = true;
                let success = state.pending_success.take()?;
                self.finish_success(&success).await;
                Some(success)
            }
        }
    }

    async fn on_engine_gone(&self, state: &mut LoopState) -> Option<ExecutionEvent> {
        match state.pending_success.take() {
            Some(success) => {
                warn!(execute_id = self.execute_id, "engine finished before the exit node ended");
                self.finish_success(&success).await;
                Some(success)
            }
            None => {
                warn!(
                    execute_id = self.execute_id,
                    "event channel closed without a terminal event"
                );
                None
            }
        }
    }

    async fn finish_success(&self, event: &ExecutionEvent) {
        if let Err(e) = self.set_root_workflow_success(event).await {
            error!(execute_id = self.execute_id, error = %e, "failed to set root workflow success");
        }
    }

    async fn set_root_workflow_success(&self, event: &ExecutionEvent) -> Result<(), EngineError> {
        let ExecutionEventKind::WorkflowSuccess {
            output,
            duration_ms,
            tokens,
        } = &event.kind
        else {
            return Err(EngineError::InvalidEvent("expected workflow_success".into()));
        };

        let exe_id = event.ctx.root_execute_id;
        let update = ExecutionUpdate::status(WorkflowStatus::Success)
            .with_output(output.clone())
            .with_duration(*duration_ms)
            .with_tokens(*tokens);
        let outcome = self
            .stores
            .store
            .update_on_status(exe_id, &update, &[WorkflowStatus::Running])
            .await?;
        expect_applied(outcome, exe_id, WorkflowStatus::Success)?;
        info!(execute_id = exe_id, duration_ms, "✅ workflow succeeded");

        let mut message = self.state_message(&event.ctx, WorkflowStatus::Success);
        message.usage = *tokens;
        self.send(StreamMessage::State(message)).await;
        Ok(())
    }

    fn state_message(&self, ctx: &EventContext, status: WorkflowStatus) -> StateMessage {
        let mut message = StateMessage::new(ctx.root_execute_id, status);
        message.event_id = ctx.resumed_event_id();
        message.space_id = ctx.root_workflow.space_id;
        message
    }

    async fn send(&self, message: StreamMessage) {
        if let Some(stream) = &self.stream {
            stream.send(message).await;
        }
    }

    async fn handle_event(&self, event: &ExecutionEvent) -> Result<TerminateSignal, EngineError> {
        let ctx = &event.ctx;
        match &event.kind {
            ExecutionEventKind::WorkflowStart { input, node_count } => {
                self.on_workflow_start(ctx, input, *node_count).await
            }
            ExecutionEventKind::WorkflowSuccess {
                output,
                duration_ms,
                tokens,
            } => {
                if ctx.is_root() {
                    return Ok(TerminateSignal::WorkflowSuccess);
                }
                // sub-workflows do not wait for their exit node
                let exe_id = ctx.execute_id();
                let update = ExecutionUpdate::status(WorkflowStatus::Success)
                    .with_output(output.clone())
                    .with_duration(*duration_ms)
                    .with_tokens(*tokens);
                let outcome = self
                    .stores
                    .store
                    .update_on_status(exe_id, &update, &[WorkflowStatus::Running])
                    .await?;
                expect_applied(outcome, exe_id, WorkflowStatus::Success)?;
                Ok(TerminateSignal::Continue)
            }
            ExecutionEventKind::WorkflowFailed {
                error,
                duration_ms,
                tokens,
            } => self.on_workflow_failed(ctx, error, *duration_ms, *tokens).await,
            ExecutionEventKind::WorkflowInterrupt { events } => {
                self.on_workflow_interrupt(ctx, events).await
            }
            ExecutionEventKind::WorkflowCancel {
                duration_ms,
                tokens,
            } => self.on_workflow_cancel(ctx, *duration_ms, *tokens).await,
            ExecutionEventKind::WorkflowResume => {
                if ctx.is_root() {
                    let message = self.state_message(ctx, WorkflowStatus::Running);
                    self.send(StreamMessage::State(message)).await;
                }
                Ok(TerminateSignal::Continue)
            }
            ExecutionEventKind::NodeStart { input, extra } => {
                let node = node_of(ctx)?;
                let mut exec = NodeExecution::new_running(
                    node.node_execute_id,
                    ctx.execute_id(),
                    node.node_key.clone(),
                    node.node_name.clone(),
                    node.node_type.clone(),
                );
                exec.input = Some(input.clone());
                exec.extra = extra.clone();
                if let Some(batch) = &node.batch {
                    exec.index = batch.index;
                    exec.items = Some(batch.items.clone());
                    exec.parent_node_id = Some(batch.composite_node_key.clone());
                }
                self.stores.store.create_node_execution(&exec).await?;
                Ok(TerminateSignal::Continue)
            }
            ExecutionEventKind::NodeEnd { .. } => self.on_node_end(event).await,
            ExecutionEventKind::NodeStreamingOutput {
                output,
                answer,
                stream_end,
            } => {
                let node = node_of(ctx)?;
                self.stores
                    .store
                    .update_streaming_output(node.node_execute_id, output)
                    .await?;

                let skip = match node.node_type {
                    NodeType::Exit => !ctx.is_root(),
                    NodeType::VariableAggregator => true,
                    _ => false,
                };
                if !skip {
                    self.send(StreamMessage::Data(DataMessage {
                        execute_id: ctx.root_execute_id,
                        node_id: node.node_key.clone(),
                        node_type: node.node_type.clone(),
                        node_title: node.node_name.clone(),
                        content: answer.clone(),
                        last: *stream_end,
                        usage: None,
                    }))
                    .await;
                }
                Ok(TerminateSignal::Continue)
            }
            ExecutionEventKind::NodeError {
                error,
                duration_ms,
                tokens,
            } => {
                let node = node_of(ctx)?;
                error!(
                    node_key = %node.node_key,
                    node_execute_id = node.node_execute_id,
                    code = %error.code,
                    "node returns err: {}",
                    error.message
                );
                let changes = NodeExecutionUpdate {
                    status: Some(NodeStatus::Failed),
                    error_info: Some(cap_reason(&error.message)),
                    error_level: Some(error.level),
                    duration_ms: Some(*duration_ms),
                    token_usage: *tokens,
                    ..Default::default()
                };
                self.stores
                    .store
                    .update_node_execution(node.node_execute_id, &changes)
                    .await?;
                Ok(TerminateSignal::Continue)
            }
        }
    }

    async fn on_workflow_start(
        &self,
        ctx: &EventContext,
        input: &str,
        node_count: i32,
    ) -> Result<TerminateSignal, EngineError> {
        let Some(sub) = &ctx.sub else {
            // the root record was created when the run was prepared
            let message = self.state_message(ctx, WorkflowStatus::Running);
            self.send(StreamMessage::State(message)).await;
            return Ok(TerminateSignal::Continue);
        };

        let parent = node_of(ctx)?;
        let mut exec = WorkflowExecution::new_root(
            sub.sub_execute_id,
            sub.workflow.id,
            sub.workflow.space_id,
            ctx.config.clone(),
        );
        exec.version = sub.workflow.version.clone();
        exec.commit_id = sub.workflow.commit_id.clone();
        exec.root_execution_id = ctx.root_execute_id;
        exec.parent_node_id = Some(parent.node_key.clone());
        exec.parent_node_execute_id = Some(parent.node_execute_id);
        exec.input = Some(input.to_string());
        exec.node_count = node_count;

        self.stores.store.create_execution(&exec).await?;
        info!(
            execute_id = sub.sub_execute_id,
            root_execute_id = ctx.root_execute_id,
            parent_node = %parent.node_key,
            "sub workflow execution created"
        );
        Ok(TerminateSignal::Continue)
    }

    async fn on_workflow_failed(
        &self,
        ctx: &EventContext,
        failure: &EngineFailure,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    ) -> Result<TerminateSignal, EngineError> {
        let exe_id = ctx.execute_id();
        error!(
            execute_id = exe_id,
            code = %failure.code,
            "workflow execution failed: {}",
            failure.message
        );

        let reason = cap_reason(&failure.message);
        let update = ExecutionUpdate::status(WorkflowStatus::Failed)
            .with_duration(duration_ms)
            .with_error(failure.code.clone(), reason.clone())
            .with_tokens(tokens);
        let outcome = self
            .stores
            .store
            .update_on_status(exe_id, &update, &[WorkflowStatus::Running])
            .await?;
        expect_applied(outcome, exe_id, WorkflowStatus::Failed)?;

        if !ctx.is_root() {
            return Ok(TerminateSignal::Continue);
        }
        let mut message = self.state_message(ctx, WorkflowStatus::Failed);
        message.usage = tokens;
        message.last_error = Some(EngineFailure {
            message: reason,
            ..failure.clone()
        });
        self.send(StreamMessage::State(message)).await;
        Ok(TerminateSignal::Abort)
    }

    async fn on_workflow_interrupt(
        &self,
        ctx: &EventContext,
        events: &[InterruptEvent],
    ) -> Result<TerminateSignal, EngineError> {
        let exe_id = ctx.execute_id();
        let root_id = ctx.root_execute_id;
        let update = ExecutionUpdate::status(WorkflowStatus::Interrupted);
        let outcome = self
            .stores
            .store
            .update_on_status(exe_id, &update, &[WorkflowStatus::Running])
            .await?;
        expect_applied(outcome, exe_id, WorkflowStatus::Interrupted)?;

        // the resumed node interrupted again: its old event never reached node end
        if let Some(resumed) = &ctx.resume_event {
            let interrupted_again = events
                .iter()
                .any(|e| e.node_key == resumed.node_key && e.node_path == resumed.node_path);
            if interrupted_again {
                let popped = self.stores.cache.pop_first(root_id).await?.ok_or(
                    EngineError::InterruptEventNotFound {
                        execute_id: root_id,
                        event_id: resumed.id,
                    },
                )?;
                if popped.id != resumed.id {
                    return Err(EngineError::InterruptEventMismatch {
                        expected: resumed.id,
                        actual: popped.id,
                    });
                }
            }
        }

        self.stores.cache.append_events(root_id, events).await?;
        info!(
            execute_id = exe_id,
            root_execute_id = root_id,
            interrupt_count = events.len(),
            "⏸️ workflow interrupted"
        );

        if !ctx.is_root() {
            return Ok(TerminateSignal::Continue);
        }

        if self.stream.is_some() {
            let head = self.stores.cache.peek_first(root_id).await?.ok_or(
                EngineError::InterruptEventNotFound {
                    execute_id: root_id,
                    event_id: 0,
                },
            )?;
            self.send(StreamMessage::Data(DataMessage {
                execute_id: root_id,
                node_id: head.node_key.clone(),
                node_type: head.node_type.clone(),
                node_title: head.node_title.clone(),
                content: head.interrupt_data.clone(),
                last: true,
                usage: None,
            }))
            .await;

            let mut message = self.state_message(ctx, WorkflowStatus::Interrupted);
            message.interrupt_event = Some(head);
            self.send(StreamMessage::State(message)).await;
        }
        Ok(TerminateSignal::Abort)
    }

    async fn on_workflow_cancel(
        &self,
        ctx: &EventContext,
        duration_ms: i64,
        tokens: Option<TokenUsage>,
    ) -> Result<TerminateSignal, EngineError> {
        let exe_id = ctx.execute_id();
        let update = ExecutionUpdate::status(WorkflowStatus::Cancelled)
            .with_duration(duration_ms)
            .with_error(ERR_WORKFLOW_CANCELED_BY_USER, CANCEL_BY_USER_REASON)
            .with_tokens(tokens);
        let outcome = self
            .stores
            .store
            .update_on_status(
                exe_id,
                &update,
                &[WorkflowStatus::Running, WorkflowStatus::Interrupted],
            )
            .await?;
        if !outcome.is_applied() {
            warn!(execute_id = exe_id, ?outcome, "cancel transition not applied");
        }

        match self.stores.store.cancel_all_running_nodes(exe_id).await {
            Ok(rows) => info!(execute_id = exe_id, rows, "🛑 workflow cancelled"),
            Err(e) => error!(execute_id = exe_id, error = %e, "failed to cancel running nodes"),
        }

        if !ctx.is_root() {
            return Ok(TerminateSignal::Continue);
        }
        let mut message = self.state_message(ctx, WorkflowStatus::Cancelled);
        message.usage = tokens;
        message.last_error = Some(EngineFailure::cancelled());
        self.send(StreamMessage::State(message)).await;
        Ok(TerminateSignal::Abort)
    }

    async fn on_node_end(&self, event: &ExecutionEvent) -> Result<TerminateSignal, EngineError> {
        let ExecutionEventKind::NodeEnd {
            output,
            raw_output,
            input,
            duration_ms,
            tokens,
            warning,
            answer,
            extra,
        } = &event.kind
        else {
            return Err(EngineError::InvalidEvent("expected node_end".into()));
        };
        let ctx = &event.ctx;
        let node = node_of(ctx)?;

        let mut changes = NodeExecutionUpdate {
            status: Some(NodeStatus::Success),
            input: input.clone(),
            output: Some(output.clone()),
            raw_output: raw_output.clone(),
            duration_ms: Some(*duration_ms),
            token_usage: *tokens,
            sub_execution_id: node.sub_execute_id.filter(|id| *id > 0),
            extra: extra.clone(),
            ..Default::default()
        };
        if let Some(warning) = warning {
            warn!(
                node_key = %node.node_key,
                node_execute_id = node.node_execute_id,
                "node end with warning: {}",
                warning.message
            );
            changes.error_info = Some(warning.message.clone());
            changes.error_level = Some(warning.level);
        }

        if let Some(resuming) = &node.resuming_event {
            let root_id = ctx.root_execute_id;
            let head = self.stores.cache.peek_first(root_id).await?;
            if head.is_some_and(|h| h.id == resuming.id) {
                let popped = self.stores.cache.pop_first(root_id).await?.ok_or(
                    EngineError::InterruptEventNotFound {
                        execute_id: root_id,
                        event_id: resuming.id,
                    },
                )?;
                if popped.id != resuming.id {
                    return Err(EngineError::InterruptEventMismatch {
                        expected: resuming.id,
                        actual: popped.id,
                    });
                }
            }
        }

        self.stores
            .store
            .update_node_execution(node.node_execute_id, &changes)
            .await?;

        let content = match node.node_type {
            NodeType::OutputEmitter => Some(answer.clone()),
            NodeType::Exit if ctx.is_root() => {
                match node.terminate_plan.unwrap_or_default() {
                    TerminatePlan::ReturnVariables => Some(output.clone()),
                    TerminatePlan::UseAnswerContent => Some(answer.clone()),
                }
            }
            _ => None,
        };
        if let Some(content) = content {
            self.send(StreamMessage::Data(DataMessage {
                execute_id: ctx.root_execute_id,
                node_id: node.node_key.clone(),
                node_type: node.node_type.clone(),
                node_title: node.node_name.clone(),
                content,
                last: true,
                usage: *tokens,
            }))
            .await;
        }

        if node.node_type == NodeType::Exit && ctx.is_root() {
            return Ok(TerminateSignal::LastNodeDone);
        }
        Ok(TerminateSignal::Continue)
    }
}
