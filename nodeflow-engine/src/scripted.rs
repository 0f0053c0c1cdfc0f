//! A graph engine that replays a fixed script of node steps.
//!
//! The canvas is JSON:
//!
//! ```json
//! {
//!   "inputs": [{"name": "query", "kind": "string", "required": true}],
//!   "terminate_plan": "return_variables",
//!   "steps": [
//!     {"type": "node", "key": "llm_1", "node_type": "LLM", "output": {"text": "hi"}},
//!     {"type": "interrupt", "key": "qa_1", "data": "{\"messages\":[]}"}
//!   ]
//! }
//! ```
//!
//! Runs emit the same events a real engine does: an Entry node, one start/end
//! pair per step, an Exit node and the workflow outcome. Used for local runs
//! and the orchestrator tests.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nodeflow_dto::dto::{
    BatchInfo, EngineFailure, ExecutionEventKind, InterruptEvent, InterruptEventType, NodeContext,
    NodeType, SubWorkflowContext, TerminatePlan, TokenUsage, WorkflowBasic, WorkflowLocator,
    ENTRY_NODE_KEY, ERR_WORKFLOW_EXECUTE_FAIL, EXIT_NODE_KEY,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::context::{ResumeContext, RunContext};
use crate::error::EngineError;
use crate::traits::{
    ExecutableGraph, GetPolicy, GraphCompiler, InputField, WorkflowEntity, WorkflowRepository,
};

fn default_node_type() -> NodeType {
    NodeType::Lambda
}

fn default_question_type() -> NodeType {
    NodeType::QuestionAnswer
}

fn default_event_type() -> InterruptEventType {
    InterruptEventType::Question
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptStep {
    Node {
        key: String,
        #[serde(default = "default_node_type")]
        node_type: NodeType,
        #[serde(default)]
        output: Value,
        #[serde(default)]
        answer: String,
        #[serde(default)]
        tokens: Option<TokenUsage>,
    },
    Stream {
        key: String,
        #[serde(default = "default_node_type")]
        node_type: NodeType,
        chunks: Vec<String>,
    },
    Interrupt {
        key: String,
        #[serde(default = "default_question_type")]
        node_type: NodeType,
        #[serde(default = "default_event_type")]
        event_type: InterruptEventType,
        data: String,
    },
    Fail {
        key: String,
        #[serde(default = "default_node_type")]
        node_type: NodeType,
        message: String,
    },
    Batch {
        key: String,
        inner_key: String,
        items: Vec<Value>,
    },
    Wait {
        key: String,
        millis: u64,
    },
    SubWorkflow {
        key: String,
        workflow_id: i64,
        #[serde(default)]
        output: Value,
    },
}

impl ScriptStep {
    pub fn key(&self) -> &str {
        match self {
            ScriptStep::Node { key, .. }
            | ScriptStep::Stream { key, .. }
            | ScriptStep::Interrupt { key, .. }
            | ScriptStep::Fail { key, .. }
            | ScriptStep::Batch { key, .. }
            | ScriptStep::Wait { key, .. }
            | ScriptStep::SubWorkflow { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScriptCanvas {
    #[serde(default)]
    pub inputs: Vec<InputField>,
    #[serde(default)]
    pub terminate_plan: TerminatePlan,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

/// Workflow definitions held in memory, one per `(id, version, commit)`.
/// Drafts have an empty version.
#[derive(Default)]
pub struct StaticWorkflowRepository {
    entries: RwLock<Vec<WorkflowEntity>>,
}

impl StaticWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts of the same draft become the current draft.
    pub fn insert(&self, entity: WorkflowEntity) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push(entity);
        }
    }

    fn lookup(&self, policy: &GetPolicy) -> Option<WorkflowEntity> {
        let entries = self.entries.read().ok()?;
        let mut candidates = entries.iter().filter(|e| e.basic.id == policy.workflow_id);
        match policy.locator {
            WorkflowLocator::Draft => candidates
                .filter(|e| e.basic.version.is_empty())
                .filter(|e| policy.commit_id.is_empty() || e.basic.commit_id == policy.commit_id)
                .last()
                .cloned(),
            WorkflowLocator::SpecificVersion => candidates
                .find(|e| e.basic.version == policy.version)
                .cloned(),
            WorkflowLocator::Latest => candidates
                .filter(|e| !e.basic.version.is_empty())
                .max_by(|a, b| a.basic.version.cmp(&b.basic.version))
                .cloned(),
        }
    }
}

#[async_trait]
impl WorkflowRepository for StaticWorkflowRepository {
    async fn get(&self, policy: &GetPolicy) -> Result<WorkflowEntity, EngineError> {
        self.lookup(policy).ok_or_else(|| {
            EngineError::WorkflowNotFound(format!(
                "workflow {} ({:?} {:?})",
                policy.workflow_id, policy.locator, policy.version
            ))
        })
    }
}

/// Compiles script canvases into [`ScriptedGraph`]s.
#[derive(Debug, Default, Clone)]
pub struct ScriptedCompiler;

#[async_trait]
impl GraphCompiler for ScriptedCompiler {
    async fn compile(
        &self,
        workflow: &WorkflowEntity,
        entry_node: Option<&str>,
    ) -> Result<Arc<dyn ExecutableGraph>, EngineError> {
        let mut canvas: ScriptCanvas = serde_json::from_str(&workflow.canvas)
            .map_err(|e| EngineError::Compile(format!("workflow {}: {}", workflow.basic.id, e)))?;

        let single_node = match entry_node {
            Some(node) => {
                let step = canvas
                    .steps
                    .iter()
                    .find(|s| s.key() == node)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::Compile(format!(
                            "node {} not found in workflow {}",
                            node, workflow.basic.id
                        ))
                    })?;
                canvas.steps = vec![step];
                true
            }
            None => false,
        };

        Ok(Arc::new(ScriptedGraph {
            canvas,
            single_node,
        }))
    }
}

pub struct ScriptedGraph {
    canvas: ScriptCanvas,
    single_node: bool,
}

enum StepOutcome {
    Continue { output: String, answer: String },
    Stop,
}

#[derive(Default)]
struct Totals {
    tokens: Option<TokenUsage>,
}

impl Totals {
    fn add(&mut self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            self.tokens.get_or_insert_with(TokenUsage::default).add(&usage);
        }
    }
}

async fn node_ctx(
    ctx: &RunContext,
    key: &str,
    node_type: NodeType,
) -> Result<NodeContext, EngineError> {
    let id = ctx.ids.gen_id().await?;
    Ok(NodeContext::new(key, id, node_type))
}

fn node_end(output: String, answer: String, tokens: Option<TokenUsage>) -> ExecutionEventKind {
    ExecutionEventKind::NodeEnd {
        output,
        raw_output: None,
        input: None,
        duration_ms: 0,
        tokens,
        warning: None,
        answer,
        extra: None,
    }
}

fn node_start(input: impl Into<String>) -> ExecutionEventKind {
    ExecutionEventKind::NodeStart {
        input: input.into(),
        extra: None,
    }
}

impl ScriptedGraph {
    async fn drive(&self, input: Map<String, Value>, ctx: &RunContext) -> Result<(), EngineError> {
        let started = Instant::now();
        let mut totals = Totals::default();
        let resume = ctx.resume.clone();

        let first = match &resume {
            None => {
                let input_json = Value::Object(input).to_string();
                ctx.emit(
                    None,
                    ExecutionEventKind::WorkflowStart {
                        input: input_json.clone(),
                        node_count: self.node_count(),
                    },
                )
                .await?;
                if !self.single_node {
                    let entry = node_ctx(ctx, ENTRY_NODE_KEY, NodeType::Entry).await?;
                    ctx.emit(Some(entry.clone()), node_start(input_json.clone())).await?;
                    ctx.emit(Some(entry), node_end(input_json, String::new(), None)).await?;
                }
                0
            }
            Some(resume) => {
                ctx.emit(None, ExecutionEventKind::WorkflowResume).await?;
                self.canvas
                    .steps
                    .iter()
                    .position(|s| s.key() == resume.event.node_key)
                    .ok_or_else(|| {
                        EngineError::InvalidEvent(format!(
                            "resumed node {} is not part of the graph",
                            resume.event.node_key
                        ))
                    })?
            }
        };

        let mut output = "{}".to_string();
        let mut answer = String::new();
        for (offset, step) in self.canvas.steps[first..].iter().enumerate() {
            if ctx.is_cancelled() {
                return self.cancel(ctx, started, &totals).await;
            }
            let resuming = if offset == 0 { resume.as_ref() } else { None };
            match self.run_step(step, ctx, resuming, started, &mut totals).await? {
                StepOutcome::Continue {
                    output: o,
                    answer: a,
                } => {
                    output = o;
                    answer = a;
                }
                StepOutcome::Stop => return Ok(()),
            }
        }
        if ctx.is_cancelled() {
            return self.cancel(ctx, started, &totals).await;
        }

        let final_output = match self.canvas.terminate_plan {
            TerminatePlan::ReturnVariables => output.clone(),
            TerminatePlan::UseAnswerContent => answer.clone(),
        };
        if !self.single_node {
            let mut exit = node_ctx(ctx, EXIT_NODE_KEY, NodeType::Exit).await?;
            exit.terminate_plan = Some(self.canvas.terminate_plan);
            ctx.emit(Some(exit.clone()), node_start(output.clone())).await?;
            ctx.emit(Some(exit), node_end(output, answer, None)).await?;
        }
        ctx.emit(
            None,
            ExecutionEventKind::WorkflowSuccess {
                output: final_output,
                duration_ms: started.elapsed().as_millis() as i64,
                tokens: totals.tokens,
            },
        )
        .await
    }

    async fn cancel(
        &self,
        ctx: &RunContext,
        started: Instant,
        totals: &Totals,
    ) -> Result<(), EngineError> {
        debug!(execute_id = ctx.root_execute_id, "scripted run observed cancellation");
        ctx.emit(
            None,
            ExecutionEventKind::WorkflowCancel {
                duration_ms: started.elapsed().as_millis() as i64,
                tokens: totals.tokens,
            },
        )
        .await
    }

    async fn run_step(
        &self,
        step: &ScriptStep,
        ctx: &RunContext,
        resuming: Option<&ResumeContext>,
        started: Instant,
        totals: &mut Totals,
    ) -> Result<StepOutcome, EngineError> {
        match step {
            ScriptStep::Node {
                key,
                node_type,
                output,
                answer,
                tokens,
            } => {
                let node = node_ctx(ctx, key, node_type.clone()).await?;
                let output = output.to_string();
                ctx.emit(Some(node.clone()), node_start("{}")).await?;
                ctx.emit(Some(node), node_end(output.clone(), answer.clone(), *tokens))
                    .await?;
                totals.add(*tokens);
                Ok(StepOutcome::Continue {
                    output,
                    answer: answer.clone(),
                })
            }
            ScriptStep::Stream {
                key,
                node_type,
                chunks,
            } => {
                let node = node_ctx(ctx, key, node_type.clone()).await?;
                ctx.emit(Some(node.clone()), node_start("{}")).await?;
                let mut full = String::new();
                for (i, chunk) in chunks.iter().enumerate() {
                    full.push_str(chunk);
                    ctx.emit(
                        Some(node.clone()),
                        ExecutionEventKind::NodeStreamingOutput {
                            output: json!({ "output": full }).to_string(),
                            answer: chunk.clone(),
                            stream_end: i + 1 == chunks.len(),
                        },
                    )
                    .await?;
                }
                let output = json!({ "output": full }).to_string();
                ctx.emit(Some(node), node_end(output.clone(), full.clone(), None))
                    .await?;
                Ok(StepOutcome::Continue {
                    output,
                    answer: full,
                })
            }
            ScriptStep::Interrupt {
                key,
                node_type,
                event_type,
                data,
            } => {
                let mut node = node_ctx(ctx, key, node_type.clone()).await?;
                if let Some(resume) = resuming {
                    node.resuming_event = Some(resume.event.clone());
                    let output = json!({ "answer": resume.data }).to_string();
                    ctx.emit(Some(node.clone()), node_start("{}")).await?;
                    ctx.emit(Some(node), node_end(output.clone(), resume.data.clone(), None))
                        .await?;
                    return Ok(StepOutcome::Continue {
                        output,
                        answer: resume.data.clone(),
                    });
                }

                ctx.emit(Some(node.clone()), node_start("{}")).await?;
                let event_id = ctx.ids.gen_id().await?;
                let mut event = InterruptEvent::new(
                    event_id,
                    key.clone(),
                    node_type.clone(),
                    *event_type,
                    data.clone(),
                );
                event.node_title = node.node_name.clone();
                event.node_path = node.node_path.clone();
                ctx.emit(
                    None,
                    ExecutionEventKind::WorkflowInterrupt {
                        events: vec![event],
                    },
                )
                .await?;
                Ok(StepOutcome::Stop)
            }
            ScriptStep::Fail {
                key,
                node_type,
                message,
            } => {
                let node = node_ctx(ctx, key, node_type.clone()).await?;
                let failure = EngineFailure::new(ERR_WORKFLOW_EXECUTE_FAIL, message.clone());
                ctx.emit(Some(node.clone()), node_start("{}")).await?;
                ctx.emit(
                    Some(node),
                    ExecutionEventKind::NodeError {
                        error: failure.clone(),
                        duration_ms: 0,
                        tokens: None,
                    },
                )
                .await?;
                ctx.emit(
                    None,
                    ExecutionEventKind::WorkflowFailed {
                        error: failure,
                        duration_ms: started.elapsed().as_millis() as i64,
                        tokens: totals.tokens,
                    },
                )
                .await?;
                Ok(StepOutcome::Stop)
            }
            ScriptStep::Batch {
                key,
                inner_key,
                items,
            } => {
                let batch = node_ctx(ctx, key, NodeType::Batch).await?;
                ctx.emit(Some(batch.clone()), node_start(Value::Array(items.clone()).to_string()))
                    .await?;

                let ids = ctx.ids.gen_multi_ids(items.len()).await?;
                let items_json = Value::Array(items.clone()).to_string();
                let mut outputs = Vec::with_capacity(items.len());
                for (index, (item, id)) in items.iter().zip(ids).enumerate() {
                    let mut inner = NodeContext::new(inner_key.clone(), id, NodeType::Lambda);
                    inner.node_path = vec![key.clone(), inner_key.clone()];
                    inner.batch = Some(BatchInfo {
                        index: index as i32,
                        items: items_json.clone(),
                        composite_node_key: key.clone(),
                    });
                    let out = json!({ "item": item });
                    ctx.emit(Some(inner.clone()), node_start(item.to_string())).await?;
                    ctx.emit(Some(inner), node_end(out.to_string(), String::new(), None))
                        .await?;
                    outputs.push(out);
                }

                let output = json!({ "outputs": outputs }).to_string();
                ctx.emit(Some(batch), node_end(output.clone(), String::new(), None))
                    .await?;
                Ok(StepOutcome::Continue {
                    output,
                    answer: String::new(),
                })
            }
            ScriptStep::Wait { key, millis } => {
                let node = node_ctx(ctx, key, NodeType::Lambda).await?;
                ctx.emit(Some(node.clone()), node_start("{}")).await?;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*millis)) => {}
                    _ = ctx.cancel.cancelled() => {
                        ctx.emit(
                            Some(node),
                            ExecutionEventKind::NodeError {
                                error: EngineFailure::cancelled(),
                                duration_ms: 0,
                                tokens: None,
                            },
                        )
                        .await?;
                        self.cancel(ctx, started, totals).await?;
                        return Ok(StepOutcome::Stop);
                    }
                }
                let output = json!({ "waited_ms": millis }).to_string();
                ctx.emit(Some(node), node_end(output.clone(), String::new(), None))
                    .await?;
                Ok(StepOutcome::Continue {
                    output,
                    answer: String::new(),
                })
            }
            ScriptStep::SubWorkflow {
                key,
                workflow_id,
                output,
            } => {
                let mut parent = node_ctx(ctx, key, NodeType::SubWorkflow).await?;
                ctx.emit(Some(parent.clone()), node_start("{}")).await?;

                let sub = SubWorkflowContext {
                    sub_execute_id: ctx.ids.gen_id().await?,
                    workflow: WorkflowBasic {
                        id: *workflow_id,
                        space_id: ctx.workflow.space_id,
                        ..Default::default()
                    },
                };
                let output = output.to_string();
                ctx.emit_in(
                    Some(sub.clone()),
                    Some(parent.clone()),
                    ExecutionEventKind::WorkflowStart {
                        input: "{}".into(),
                        node_count: 1,
                    },
                )
                .await?;
                ctx.emit_in(
                    Some(sub.clone()),
                    None,
                    ExecutionEventKind::WorkflowSuccess {
                        output: output.clone(),
                        duration_ms: 0,
                        tokens: None,
                    },
                )
                .await?;

                parent.sub_execute_id = Some(sub.sub_execute_id);
                ctx.emit(Some(parent), node_end(output.clone(), String::new(), None))
                    .await?;
                Ok(StepOutcome::Continue {
                    output,
                    answer: String::new(),
                })
            }
        }
    }
}

#[async_trait]
impl ExecutableGraph for ScriptedGraph {
    fn node_count(&self) -> i32 {
        let extra = if self.single_node { 0 } else { 2 };
        self.canvas.steps.len() as i32 + extra
    }

    fn inputs(&self) -> &[InputField] {
        &self.canvas.inputs
    }

    fn terminate_plan(&self) -> TerminatePlan {
        self.canvas.terminate_plan
    }

    async fn run(&self, input: Map<String, Value>, ctx: RunContext) {
        match self.drive(input, &ctx).await {
            Ok(()) => {}
            Err(EngineError::EventLoopClosed(id)) => {
                debug!(execute_id = id, "event loop gone, scripted run stops");
            }
            Err(e) => {
                warn!(execute_id = ctx.root_execute_id, error = %e, "scripted run failed");
                let failure = EngineFailure::new(ERR_WORKFLOW_EXECUTE_FAIL, e.to_string());
                let _ = ctx
                    .emit(
                        None,
                        ExecutionEventKind::WorkflowFailed {
                            error: failure,
                            duration_ms: 0,
                            tokens: None,
                        },
                    )
                    .await;
            }
        }
    }
}

/// Build a workflow entity from a canvas value, for tests and local runs.
pub fn scripted_workflow(basic: WorkflowBasic, canvas: &Value) -> WorkflowEntity {
    WorkflowEntity {
        basic,
        app_id: None,
        canvas: canvas.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: i64, version: &str, commit: &str) -> WorkflowBasic {
        WorkflowBasic {
            id,
            space_id: 1,
            version: version.into(),
            commit_id: commit.into(),
        }
    }

    #[tokio::test]
    async fn repository_resolves_locators() {
        let repo = StaticWorkflowRepository::new();
        repo.insert(scripted_workflow(basic(1, "", "c1"), &json!({"steps": []})));
        repo.insert(scripted_workflow(basic(1, "", "c2"), &json!({"steps": []})));
        repo.insert(scripted_workflow(basic(1, "v0.0.1", "p1"), &json!({"steps": []})));
        repo.insert(scripted_workflow(basic(1, "v0.0.2", "p2"), &json!({"steps": []})));

        let draft = repo.get(&GetPolicy::draft(1)).await.unwrap();
        assert_eq!(draft.basic.commit_id, "c2");

        let mut pinned = GetPolicy::draft(1);
        pinned.commit_id = "c1".into();
        assert_eq!(repo.get(&pinned).await.unwrap().basic.commit_id, "c1");

        let latest = GetPolicy {
            locator: WorkflowLocator::Latest,
            ..GetPolicy::draft(1)
        };
        assert_eq!(repo.get(&latest).await.unwrap().basic.version, "v0.0.2");

        let missing = GetPolicy {
            locator: WorkflowLocator::SpecificVersion,
            version: "v9".into(),
            ..GetPolicy::draft(1)
        };
        assert!(matches!(
            repo.get(&missing).await,
            Err(EngineError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn compiler_restricts_to_entry_node() {
        let canvas = json!({
            "inputs": [{"name": "q", "kind": "string", "required": true}],
            "steps": [
                {"type": "node", "key": "a", "output": {"x": 1}},
                {"type": "interrupt", "key": "q", "data": "{}"}
            ]
        });
        let entity = scripted_workflow(basic(2, "", "c"), &canvas);

        let full = ScriptedCompiler.compile(&entity, None).await.unwrap();
        assert_eq!(full.node_count(), 4);
        assert_eq!(full.inputs().len(), 1);

        let single = ScriptedCompiler.compile(&entity, Some("q")).await.unwrap();
        assert_eq!(single.node_count(), 1);

        assert!(matches!(
            ScriptedCompiler.compile(&entity, Some("zz")).await,
            Err(EngineError::Compile(_))
        ));
    }
}
