use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nodeflow_dto::dto::{
    ExecuteConfig, ExecuteMode, NodeExecution, NodeType, ResumeRequest, SyncPattern,
    WorkflowExecution, WorkflowLocator, WorkflowStatus, CANCEL_BY_USER_REASON, ENTRY_NODE_KEY,
    ERR_WORKFLOW_CANCELED_BY_USER,
};
use nodeflow_engine::input::convert_inputs;
use nodeflow_engine::merge::{group_composite_children, merge_composite_inner_nodes};
use nodeflow_engine::{
    pipe, EngineError, ExecutableGraph, ExecutionStream, GetPolicy, PreparedRun, RunRequest,
    StreamWriter,
};
use nodeflow_storage::entities::{ExecutionUpdate, UpdateOutcome};
use nodeflow_storage::traits::{ExecutionRecordStore, LatestExecutionStore};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::error::{ExecError, ExecResult};
use crate::service::{CancelOutcome, ExecutableService, LatestExecution, NodeExecutionView};

#[derive(Clone, Debug)]
pub struct ExecutableSvc {
    state: Arc<AppState>,
}

impl ExecutableSvc {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn start_run(
        &self,
        mut config: ExecuteConfig,
        input: Map<String, Value>,
        entry_node: Option<&str>,
        stream: Option<StreamWriter>,
    ) -> ExecResult<(PreparedRun, Arc<dyn ExecutableGraph>, Map<String, Value>)> {
        let policy = GetPolicy {
            workflow_id: config.workflow_id,
            locator: config.from,
            version: config.version.clone(),
            commit_id: config.commit_id.clone(),
        };
        let entity = self.state.repository.get(&policy).await?;
        let graph = self.state.compiler.compile(&entity, entry_node).await?;

        let fail_fast = config.input_fail_fast || self.state.config.input_fail_fast;
        let converted = convert_inputs(&input, graph.inputs(), fail_fast)?;
        let input_json = serde_json::to_string(&converted.values)
            .map_err(EngineError::from)?;

        config.version = entity.basic.version.clone();
        config.commit_id = entity.basic.commit_id.clone();
        if config.app_id.is_none() {
            config.app_id = entity.app_id;
        }

        let prepared = self
            .state
            .runner()
            .prepare(RunRequest {
                basic: entity.basic,
                config,
                input: input_json,
                node_count: graph.node_count(),
                resume: None,
                stream,
            })
            .await?;
        Ok((prepared, graph, converted.values))
    }

    async fn resume_run(
        &self,
        req: ResumeRequest,
        pattern: SyncPattern,
        stream: Option<StreamWriter>,
    ) -> ExecResult<(PreparedRun, Arc<dyn ExecutableGraph>, Map<String, Value>)> {
        let exe = self
            .state
            .store
            .get_execution(req.execute_id)
            .await?
            .ok_or_else(|| ExecError::NotFound(format!("workflow execution {}", req.execute_id)))?;
        if !exe.is_root() {
            return Err(ExecError::NotRoot {
                execute_id: exe.id,
                current: exe.status,
            });
        }
        if exe.status != WorkflowStatus::Interrupted {
            return Err(ExecError::StatusConflict {
                execute_id: exe.id,
                current: exe.status,
                message: "only interrupted executions can be resumed".into(),
            });
        }

        let policy = GetPolicy {
            workflow_id: exe.workflow_id,
            locator: if exe.version.is_empty() {
                WorkflowLocator::Draft
            } else {
                WorkflowLocator::SpecificVersion
            },
            version: exe.version.clone(),
            commit_id: exe.commit_id.clone(),
        };
        let entity = self.state.repository.get(&policy).await?;

        let entry_node = if exe.config.mode == ExecuteMode::NodeDebug {
            self.state
                .store
                .get_node_executions(exe.id)
                .await?
                .into_iter()
                .find(|n| n.parent_node_id.is_none())
                .map(|n| n.node_id)
        } else {
            None
        };
        let graph = self
            .state
            .compiler
            .compile(&entity, entry_node.as_deref())
            .await?;

        let input: Map<String, Value> = exe
            .input
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        let mut config = exe.config.clone();
        config.sync_pattern = Some(pattern);

        let prepared = self
            .state
            .runner()
            .prepare(RunRequest {
                basic: entity.basic,
                config,
                input: exe.input.clone().unwrap_or_default(),
                node_count: graph.node_count(),
                resume: Some(req),
                stream,
            })
            .await?;
        Ok((prepared, graph, input))
    }

    fn launch(
        graph: Arc<dyn ExecutableGraph>,
        input: Map<String, Value>,
        prepared: PreparedRun,
    ) -> i64 {
        let PreparedRun { execute_id, ctx, .. } = prepared;
        tokio::spawn(async move { graph.run(input, ctx).await });
        execute_id
    }

    async fn merged_inner(
        &self,
        execute_id: i64,
        node: &NodeExecution,
    ) -> ExecResult<Option<NodeExecution>> {
        let children = self
            .state
            .store
            .get_node_executions_by_parent(execute_id, &node.node_id)
            .await?;
        let inner_key = format!("{}_inner", node.node_id);
        if children.is_empty() || children.iter().any(|c| c.node_id != inner_key) {
            return Ok(None);
        }
        let by_index: BTreeMap<i32, NodeExecution> =
            children.into_iter().map(|c| (c.index, c)).collect();
        Ok(merge_composite_inner_nodes(&by_index))
    }

    async fn latest_view(&self, execute_id: i64, node_id: &str) -> Option<LatestExecution> {
        match self.get_node_execution(execute_id, node_id).await {
            Ok(view) => Some(LatestExecution { execute_id, view }),
            Err(e) => {
                warn!(execute_id, node_id, error = %e, "failed to load latest execution input");
                None
            }
        }
    }
}

#[async_trait]
impl ExecutableService for ExecutableSvc {
    async fn sync_execute(
        &self,
        mut config: ExecuteConfig,
        input: Map<String, Value>,
    ) -> ExecResult<WorkflowExecution> {
        config.sync_pattern = Some(SyncPattern::Sync);
        let (prepared, graph, input) = self.start_run(config, input, None, None).await?;
        let PreparedRun {
            execute_id,
            ctx,
            completion,
        } = prepared;

        tokio::spawn(async move { graph.run(input, ctx).await });
        if completion.wait().await.is_none() {
            warn!(execute_id, "sync run ended without a terminal event");
        }
        self.get_execution(execute_id, false).await
    }

    async fn async_execute(
        &self,
        mut config: ExecuteConfig,
        input: Map<String, Value>,
    ) -> ExecResult<i64> {
        config.sync_pattern = Some(SyncPattern::Async);
        let (workflow_id, operator_id, mode) =
            (config.workflow_id, config.operator_id, config.mode);
        let (prepared, graph, input) = self.start_run(config, input, None, None).await?;
        let execute_id = Self::launch(graph, input, prepared);

        if mode == ExecuteMode::Debug {
            if let Err(e) = self
                .state
                .cache
                .set_latest_test_run(workflow_id, operator_id, execute_id)
                .await
            {
                error!(execute_id, error = %e, "failed to record latest test run");
            }
        }
        Ok(execute_id)
    }

    async fn async_execute_node(
        &self,
        mut config: ExecuteConfig,
        node_id: &str,
        input: Map<String, Value>,
    ) -> ExecResult<i64> {
        config.sync_pattern = Some(SyncPattern::Async);
        config.mode = ExecuteMode::NodeDebug;
        let (workflow_id, operator_id) = (config.workflow_id, config.operator_id);
        let (prepared, graph, input) = self.start_run(config, input, Some(node_id), None).await?;
        let execute_id = Self::launch(graph, input, prepared);

        if let Err(e) = self
            .state
            .cache
            .set_latest_node_debug(workflow_id, node_id, operator_id, execute_id)
            .await
        {
            error!(execute_id, node_id, error = %e, "failed to record latest node debug");
        }
        Ok(execute_id)
    }

    async fn stream_execute(
        &self,
        mut config: ExecuteConfig,
        input: Map<String, Value>,
    ) -> ExecResult<ExecutionStream> {
        config.sync_pattern = Some(SyncPattern::Stream);
        let (writer, stream) = pipe(self.state.config.stream_buffer);
        let (prepared, graph, input) = self.start_run(config, input, None, Some(writer)).await?;
        Self::launch(graph, input, prepared);
        Ok(stream)
    }

    async fn async_resume(&self, req: ResumeRequest) -> ExecResult<()> {
        let (prepared, graph, input) = self.resume_run(req, SyncPattern::Async, None).await?;
        Self::launch(graph, input, prepared);
        Ok(())
    }

    async fn stream_resume(&self, req: ResumeRequest) -> ExecResult<ExecutionStream> {
        let (writer, stream) = pipe(self.state.config.stream_buffer);
        let (prepared, graph, input) = self
            .resume_run(req, SyncPattern::Stream, Some(writer))
            .await?;
        Self::launch(graph, input, prepared);
        Ok(stream)
    }

    async fn cancel(
        &self,
        execute_id: i64,
        workflow_id: i64,
        space_id: i64,
    ) -> ExecResult<CancelOutcome> {
        let store = &self.state.store;
        let exe = store
            .get_execution(execute_id)
            .await?
            .ok_or_else(|| ExecError::NotFound(format!("workflow execution {}", execute_id)))?;
        if exe.workflow_id != workflow_id || exe.space_id != space_id {
            return Err(ExecError::BadRequest(format!(
                "execution {} does not belong to workflow {} in space {}",
                execute_id, workflow_id, space_id
            )));
        }
        if !exe.is_root() {
            return Err(ExecError::NotRoot {
                execute_id,
                current: exe.status,
            });
        }
        if exe.status.is_terminal() {
            info!(execute_id, status = %exe.status, "cancel ignored, execution already finished");
            return Ok(CancelOutcome::AlreadyTerminal(exe.status));
        }

        let mut outcome = CancelOutcome::SignalSent;
        if exe.status == WorkflowStatus::Interrupted {
            let duration_ms = (Utc::now() - exe.created_at).num_milliseconds();
            let update = ExecutionUpdate::status(WorkflowStatus::Cancelled)
                .with_duration(duration_ms)
                .with_error(ERR_WORKFLOW_CANCELED_BY_USER, CANCEL_BY_USER_REASON);
            match store
                .update_on_status(execute_id, &update, &[WorkflowStatus::Interrupted])
                .await?
            {
                UpdateOutcome::Applied { .. } => {
                    let rows = store.cancel_all_running_nodes(execute_id).await?;
                    info!(execute_id, rows, "🛑 interrupted execution cancelled");
                    outcome = CancelOutcome::Cancelled;
                }
                UpdateOutcome::Conflict { current } => {
                    warn!(
                        execute_id,
                        current = %current,
                        "execution left interrupted before cancel"
                    );
                    if current != WorkflowStatus::Running {
                        store.cancel_all_running_nodes(execute_id).await?;
                    }
                    if current.is_terminal() {
                        outcome = CancelOutcome::AlreadyTerminal(current);
                    }
                }
                UpdateOutcome::NotFound => {
                    return Err(ExecError::NotFound(format!(
                        "workflow execution {}",
                        execute_id
                    )))
                }
            }
        }

        self.state.cache.set_cancel_flag(execute_id).await?;
        info!(execute_id, ?outcome, "cancel requested");
        Ok(outcome)
    }

    async fn get_execution(
        &self,
        execute_id: i64,
        include_nodes: bool,
    ) -> ExecResult<WorkflowExecution> {
        let Some(mut exe) = self.state.store.get_execution(execute_id).await? else {
            debug!(execute_id, "execution not visible yet, returning running placeholder");
            return Ok(WorkflowExecution::transient_running(execute_id));
        };

        if let Some(head) = self.state.cache.peek_first(execute_id).await? {
            if exe.status == WorkflowStatus::Interrupted
                || exe.current_resuming_event_id == Some(head.id)
            {
                exe.interrupt_events = vec![head];
            }
        }

        if include_nodes {
            let nodes = self.state.store.get_node_executions(execute_id).await?;
            exe.node_executions = group_composite_children(nodes);
        }
        Ok(exe)
    }

    async fn get_node_execution(
        &self,
        execute_id: i64,
        node_id: &str,
    ) -> ExecResult<NodeExecutionView> {
        let node = self
            .state
            .store
            .get_node_execution(execute_id, node_id)
            .await?
            .ok_or_else(|| {
                ExecError::NotFound(format!("node {} of execution {}", node_id, execute_id))
            })?;

        let inner = if node.node_type == NodeType::Batch {
            let exe = self
                .state
                .store
                .get_execution(execute_id)
                .await?
                .ok_or_else(|| ExecError::NotFound(format!("workflow execution {}", execute_id)))?;
            if exe.config.mode == ExecuteMode::NodeDebug {
                self.merged_inner(execute_id, &node).await?
            } else {
                None
            }
        } else {
            None
        };

        Ok(NodeExecutionView { node, inner })
    }

    async fn get_latest_test_run_input(
        &self,
        workflow_id: i64,
        user_id: i64,
    ) -> Option<LatestExecution> {
        let execute_id = match self.state.cache.get_latest_test_run(workflow_id, user_id).await {
            Ok(id) => id?,
            Err(e) => {
                warn!(workflow_id, user_id, error = %e, "failed to read latest test run");
                return None;
            }
        };
        self.latest_view(execute_id, ENTRY_NODE_KEY).await
    }

    async fn get_latest_node_debug_input(
        &self,
        workflow_id: i64,
        node_id: &str,
        user_id: i64,
    ) -> Option<LatestExecution> {
        let execute_id = match self
            .state
            .cache
            .get_latest_node_debug(workflow_id, node_id, user_id)
            .await
        {
            Ok(id) => id?,
            Err(e) => {
                warn!(
                    workflow_id,
                    node_id,
                    user_id,
                    error = %e,
                    "failed to read latest node debug"
                );
                return None;
            }
        };
        self.latest_view(execute_id, node_id).await
    }
}
